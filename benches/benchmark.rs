use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pdf_render_tool::{Config, PageSettings, PaperFormat, RenderRequest};
use std::time::Duration;

#[cfg(feature = "integration_benchmarks")]
use pdf_render_tool::RenderService;
#[cfg(feature = "integration_benchmarks")]
use tokio::runtime::Runtime;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

// === UNIT BENCHMARKS ===

fn benchmark_config_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    configure_fast_group(&mut group);

    group.bench_function("creation", |b| {
        b.iter(|| {
            let config = Config::default();
            black_box(config);
        });
    });

    group.finish();
}

fn benchmark_render_request_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_request");
    configure_fast_group(&mut group);

    group.bench_function("creation", |b| {
        b.iter(|| {
            let request = RenderRequest::url("https://example.com");
            black_box(request);
        });
    });

    group.finish();
}

fn benchmark_print_params(c: &mut Criterion) {
    let mut group = c.benchmark_group("print_params");
    configure_fast_group(&mut group);

    let settings = PageSettings {
        format: PaperFormat::Letter,
        scale: 1.2,
        ..Default::default()
    };

    group.bench_function("mapping", |b| {
        b.iter(|| {
            let params = settings.to_print_params();
            black_box(params);
        });
    });

    group.finish();
}

fn benchmark_url_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("url_validation");
    configure_fast_group(&mut group);

    let test_urls = vec![
        "https://example.com",
        "http://example.com/path",
        "invalid-url",
    ];

    group.bench_function("validate", |b| {
        b.iter(|| {
            for url in &test_urls {
                let result = pdf_render_tool::validate_url(url);
                let _ = black_box(result);
            }
        });
    });

    group.finish();
}

fn benchmark_filename_sanitization(c: &mut Criterion) {
    let mut group = c.benchmark_group("filename_sanitization");
    configure_fast_group(&mut group);

    let test_filenames = vec![
        "normal_file.pdf",
        "file with spaces.pdf",
        "file/with/slashes.pdf",
    ];

    group.bench_function("sanitize", |b| {
        b.iter(|| {
            for filename in &test_filenames {
                let sanitized = pdf_render_tool::sanitize_filename(filename);
                black_box(sanitized);
            }
        });
    });

    group.finish();
}

fn benchmark_format_utilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_utilities");
    configure_fast_group(&mut group);

    let test_durations = vec![Duration::from_millis(100), Duration::from_secs(5)];
    let test_byte_sizes = vec![1024, 1048576];

    group.bench_function("format_duration", |b| {
        b.iter(|| {
            for duration in &test_durations {
                let formatted = pdf_render_tool::format_duration(*duration);
                black_box(formatted);
            }
        });
    });

    group.bench_function("format_bytes", |b| {
        b.iter(|| {
            for size in &test_byte_sizes {
                let formatted = pdf_render_tool::format_bytes(*size);
                black_box(formatted);
            }
        });
    });

    group.finish();
}

// === INTEGRATION BENCHMARKS (require Chrome) ===

#[cfg(feature = "integration_benchmarks")]
fn benchmark_service_creation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("service_creation");
    configure_fast_group(&mut group);

    group.bench_function("single_browser", |b| {
        b.iter(|| {
            rt.block_on(async {
                let config = Config {
                    browser_pool_size: 1,
                    max_concurrent_renders: 1,
                    chrome_path: None,
                    render_timeout: Duration::from_secs(5),
                    ..Default::default()
                };

                let service = RenderService::new(config).await.unwrap();
                service.shutdown().await;
                black_box(service);
            })
        });
    });

    group.finish();
}

#[cfg(feature = "integration_benchmarks")]
fn benchmark_html_render(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("html_render");
    configure_fast_group(&mut group);

    group.bench_function("single_page", |b| {
        b.iter(|| {
            rt.block_on(async {
                let config = Config {
                    browser_pool_size: 1,
                    max_concurrent_renders: 1,
                    chrome_path: None,
                    render_timeout: Duration::from_secs(5),
                    ..Default::default()
                };

                let service = RenderService::new(config).await.unwrap();

                let result = service
                    .render_html("<html><body><h1>Benchmark</h1></body></html>", None)
                    .await;
                let success = result.is_ok();

                service.shutdown().await;
                black_box(success);
            })
        });
    });

    group.finish();
}

#[cfg(feature = "integration_benchmarks")]
fn benchmark_concurrent_renders(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_renders");
    configure_fast_group(&mut group);

    group.bench_function("concurrent_3", |b| {
        b.iter(|| {
            rt.block_on(async {
                let config = Config {
                    browser_pool_size: 2,
                    max_concurrent_renders: 3,
                    chrome_path: None,
                    render_timeout: Duration::from_secs(5),
                    ..Default::default()
                };

                let service = RenderService::new(config).await.unwrap();

                let urls = vec![
                    "https://example.com".to_string(),
                    "https://httpbin.org/html".to_string(),
                    "https://github.com".to_string(),
                ];

                let results = service.render_urls(urls).await;
                let successful = match results {
                    Ok(results) => results.iter().filter(|r| r.success).count(),
                    Err(_) => 0,
                };

                service.shutdown().await;
                black_box(successful);
            })
        });
    });

    group.finish();
}

// === BENCHMARK GROUPS ===

criterion_group!(
    unit_benches,
    benchmark_config_creation,
    benchmark_render_request_creation,
    benchmark_print_params,
    benchmark_url_validation,
    benchmark_filename_sanitization,
    benchmark_format_utilities,
);

#[cfg(feature = "integration_benchmarks")]
criterion_group!(
    integration_benches,
    benchmark_service_creation,
    benchmark_html_render,
    benchmark_concurrent_renders,
);

#[cfg(feature = "integration_benchmarks")]
criterion_main!(unit_benches, integration_benches);

#[cfg(not(feature = "integration_benchmarks"))]
criterion_main!(unit_benches);
