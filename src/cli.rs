use crate::{
    format_bytes, format_duration, BatchProcessor, Config, Margins, Orientation, OutputKind,
    PageSettings, PaperFormat, ProgressTracker, RenderRequest, RenderService, WaitUntil,
};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pdf-render-tool")]
#[command(about = "Render URLs and HTML to PDF documents or screenshots")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Browser pool size")]
    pub pool_size: Option<usize>,

    #[arg(long, help = "Maximum concurrent renders")]
    pub max_concurrent: Option<usize>,

    #[arg(long, help = "Render timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a single URL
    Single {
        #[arg(short, long, help = "URL to render")]
        url: String,

        #[arg(short, long, help = "Output file path (defaults to the save directory)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Capture a screenshot instead of printing a PDF")]
        screenshot: bool,

        #[arg(long, help = "Paper format (a3, a4, a5, letter, legal, tabloid)")]
        paper: Option<String>,

        #[arg(long, help = "Landscape orientation")]
        landscape: bool,

        #[arg(long, help = "Uniform margin in inches")]
        margin: Option<f64>,

        #[arg(long, help = "Content scale factor")]
        scale: Option<f64>,

        #[arg(long, help = "Page-load wait condition (load, idle)")]
        wait_until: Option<String>,

        #[arg(long, help = "Extra delay in milliseconds before rendering")]
        delay: Option<u64>,

        #[arg(long, help = "Skip CSS backgrounds in PDF output")]
        no_background: bool,
    },

    /// Render a local HTML file
    Html {
        #[arg(short, long, help = "HTML file to render")]
        input: PathBuf,

        #[arg(short, long, help = "Output file path (defaults to the save directory)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Paper format (a3, a4, a5, letter, legal, tabloid)")]
        paper: Option<String>,

        #[arg(long, help = "Landscape orientation")]
        landscape: bool,

        #[arg(long, help = "Uniform margin in inches")]
        margin: Option<f64>,

        #[arg(long, help = "Content scale factor")]
        scale: Option<f64>,

        #[arg(long, help = "Extra delay in milliseconds before rendering")]
        delay: Option<u64>,

        #[arg(long, help = "Skip CSS backgrounds in PDF output")]
        no_background: bool,
    },

    /// Render URLs from a file, one output file each
    Batch {
        #[arg(short, long, help = "Input file containing URLs (one per line)")]
        input: PathBuf,

        #[arg(short, long, help = "Output directory for rendered files")]
        output: PathBuf,

        #[arg(long, help = "Capture screenshots instead of printing PDFs")]
        screenshot: bool,

        #[arg(long, help = "Paper format (a3, a4, a5, letter, legal, tabloid)")]
        paper: Option<String>,

        #[arg(long, help = "Landscape orientation")]
        landscape: bool,

        #[arg(long, help = "Progress reporting interval in seconds")]
        progress_interval: Option<u64>,
    },

    /// Render URLs from a file and merge into a single PDF
    Merge {
        #[arg(short, long, help = "Input file containing URLs (one per line)")]
        input: PathBuf,

        #[arg(short, long, help = "Output PDF path")]
        output: PathBuf,

        #[arg(long, help = "Paper format (a3, a4, a5, letter, legal, tabloid)")]
        paper: Option<String>,

        #[arg(long, help = "Landscape orientation")]
        landscape: bool,
    },

    /// Delete persisted output files older than the given age
    Cleanup {
        #[arg(long, help = "Age threshold in seconds")]
        age_secs: u64,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },

    /// Show system information and health
    Health {
        #[arg(long, help = "Show detailed browser pool information")]
        detailed: bool,
    },
}

/// Page setup flags shared by the render subcommands.
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    pub paper: Option<String>,
    pub landscape: bool,
    pub margin: Option<f64>,
    pub scale: Option<f64>,
    pub wait_until: Option<String>,
    pub delay: Option<u64>,
    pub no_background: bool,
}

pub struct CliRunner {
    pub config: Config,
    pub service: Arc<RenderService>,
}

impl CliRunner {
    pub async fn new(mut config: Config, args: &Cli) -> anyhow::Result<Self> {
        // Override config with CLI args
        if let Some(pool_size) = args.pool_size {
            config.browser_pool_size = pool_size;
        }
        if let Some(max_concurrent) = args.max_concurrent {
            config.max_concurrent_renders = max_concurrent;
        }
        if let Some(timeout) = args.timeout {
            config.render_timeout = Duration::from_secs(timeout);
        }
        if let Some(chrome_path) = &args.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }

        let service = Arc::new(RenderService::new(config.clone()).await?);

        Ok(Self { config, service })
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Single {
                url,
                output,
                screenshot,
                paper,
                landscape,
                margin,
                scale,
                wait_until,
                delay,
                no_background,
            } => {
                self.run_single(
                    url,
                    output,
                    screenshot,
                    PageOptions {
                        paper,
                        landscape,
                        margin,
                        scale,
                        wait_until,
                        delay,
                        no_background,
                    },
                )
                .await
            }
            Commands::Html {
                input,
                output,
                paper,
                landscape,
                margin,
                scale,
                delay,
                no_background,
            } => {
                self.run_html(
                    input,
                    output,
                    PageOptions {
                        paper,
                        landscape,
                        margin,
                        scale,
                        delay,
                        no_background,
                        ..Default::default()
                    },
                )
                .await
            }
            Commands::Batch {
                input,
                output,
                screenshot,
                paper,
                landscape,
                progress_interval,
            } => {
                self.run_batch(
                    input,
                    output,
                    screenshot,
                    PageOptions {
                        paper,
                        landscape,
                        ..Default::default()
                    },
                    progress_interval,
                )
                .await
            }
            Commands::Merge {
                input,
                output,
                paper,
                landscape,
            } => {
                self.run_merge(
                    input,
                    output,
                    PageOptions {
                        paper,
                        landscape,
                        ..Default::default()
                    },
                )
                .await
            }
            Commands::Cleanup { age_secs } => self.run_cleanup(age_secs).await,
            Commands::Validate { config } => self.validate_config(config).await,
            Commands::Health { detailed } => self.show_health(detailed).await,
        }
    }

    pub async fn run_single(
        &self,
        url: String,
        output: Option<PathBuf>,
        screenshot: bool,
        options: PageOptions,
    ) -> anyhow::Result<()> {
        info!("Rendering: {}", url);

        let request = RenderRequest {
            output: if screenshot {
                OutputKind::Screenshot
            } else {
                OutputKind::Pdf
            },
            page: Some(self.build_page_settings(&options)?),
            ..RenderRequest::url(url)
        };

        let result = self.service.render_single(request).await?;

        if result.success {
            let path = self.write_result_data(&result.data, output).await?;
            info!("Output saved to: {}", path.display());

            println!("Render completed:");
            println!("  Source: {}", result.source);
            println!("  Output: {}", path.display());
            println!("  Kind: {:?}", result.output);
            println!("  Size: {}", format_bytes(result.data.len()));
            println!("  Duration: {}", format_duration(result.duration));

            if let Some(pages) = result.metadata.page_count {
                println!("  Pages: {pages}");
            }
            if let Some(title) = &result.metadata.page_title {
                println!("  Title: {title}");
            }
        } else {
            error!("Render failed: {:?}", result.error);
            return Err(anyhow!("Render failed: {:?}", result.error));
        }

        Ok(())
    }

    pub async fn run_html(
        &self,
        input: PathBuf,
        output: Option<PathBuf>,
        options: PageOptions,
    ) -> anyhow::Result<()> {
        let html = fs::read_to_string(&input)
            .await
            .with_context(|| format!("failed to read {}", input.display()))?;

        info!("Rendering HTML from {}", input.display());

        let settings = self.build_page_settings(&options)?;
        let result = self.service.render_html(html, Some(settings)).await?;

        if result.success {
            let path = self.write_result_data(&result.data, output).await?;
            println!("Rendered {} to {}", input.display(), path.display());
            println!("  Size: {}", format_bytes(result.data.len()));
            println!("  Duration: {}", format_duration(result.duration));
        } else {
            error!("Render failed: {:?}", result.error);
            return Err(anyhow!("Render failed: {:?}", result.error));
        }

        Ok(())
    }

    pub async fn run_batch(
        &self,
        input: PathBuf,
        output: PathBuf,
        screenshot: bool,
        options: PageOptions,
        progress_interval: Option<u64>,
    ) -> anyhow::Result<()> {
        info!("Starting batch render");

        let urls = self.read_urls_from_file(&input).await?;
        info!("Loaded {} URLs from {}", urls.len(), input.display());

        fs::create_dir_all(&output).await?;

        let settings = self.build_page_settings(&options)?;
        let kind = if screenshot {
            OutputKind::Screenshot
        } else {
            OutputKind::Pdf
        };

        let requests: Vec<RenderRequest> = urls
            .into_iter()
            .map(|url| RenderRequest {
                output: kind,
                page: Some(settings.clone()),
                ..RenderRequest::url(url)
            })
            .collect();

        let progress_tracker = Arc::new(ProgressTracker::new(requests.len()));

        if let Some(interval) = progress_interval {
            let tracker = progress_tracker.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(interval));

                while !tracker.is_complete() {
                    interval.tick().await;
                    let progress = tracker.get_progress();

                    println!(
                        "Progress: {}/{} ({:.1}%) - Success: {}, Errors: {}, Rate: {:.1}/s, ETA: {:?}",
                        progress.completed,
                        progress.total,
                        (progress.completed as f64 / progress.total as f64) * 100.0,
                        progress.success,
                        progress.errors,
                        progress.rate,
                        progress.eta
                    );
                }
            });
        }

        let mut processor = BatchProcessor::new(self.config.clone(), self.service.clone());
        let results = processor.process_batch(requests).await;

        let mut success_count = 0;
        let mut error_count = 0;

        for result in results {
            progress_tracker.record_completion(result.success);

            if result.success {
                let filename = self.generate_filename(&result.source, result.output);
                let filepath = output.join(filename);

                fs::write(&filepath, &result.data).await?;
                success_count += 1;

                info!("Saved render: {}", filepath.display());
            } else {
                error_count += 1;
                warn!("Failed to render {}: {:?}", result.source, result.error);
            }
        }

        info!(
            "Batch completed. Success: {}, Errors: {}",
            success_count, error_count
        );
        Ok(())
    }

    pub async fn run_merge(
        &self,
        input: PathBuf,
        output: PathBuf,
        options: PageOptions,
    ) -> anyhow::Result<()> {
        let urls = self.read_urls_from_file(&input).await?;
        info!("Rendering and merging {} URLs", urls.len());

        let settings = self.build_page_settings(&options)?;
        let merged = self.service.render_urls_merged(urls, Some(settings)).await?;

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&output, &merged).await?;

        println!(
            "Merged PDF written to {} ({})",
            output.display(),
            format_bytes(merged.len())
        );

        Ok(())
    }

    pub async fn run_cleanup(&self, age_secs: u64) -> anyhow::Result<()> {
        let store = self.service.output_store();
        let removed = store
            .cleanup_older_than(Duration::from_secs(age_secs))
            .await?;

        println!(
            "Removed {} files older than {}s from {}",
            removed.len(),
            age_secs,
            store.save_dir().display()
        );
        for path in removed {
            println!("  {}", path.display());
        }

        Ok(())
    }

    pub async fn validate_config(&self, config_path: PathBuf) -> anyhow::Result<()> {
        println!("Validating configuration: {}", config_path.display());

        let config_content = fs::read_to_string(&config_path).await?;
        let config: Config = serde_json::from_str(&config_content)?;

        println!("Configuration is valid:");
        println!("  Browser pool size: {}", config.browser_pool_size);
        println!("  Max concurrent: {}", config.max_concurrent_renders);
        println!("  Timeout: {:?}", config.render_timeout);
        println!("  Output: {:?}", config.output);
        println!("  Paper: {:?}", config.page.format);
        println!("  Save dir: {}", config.save_dir.display());

        Ok(())
    }

    pub async fn show_health(&self, detailed: bool) -> anyhow::Result<()> {
        println!("System Health Check");
        println!("==================");

        let pool_stats = self.service.browser_pool.get_stats().await;
        println!("Browser Pool:");
        println!("  Total slots: {}", pool_stats.total_slots);
        println!("  Idle slots: {}", pool_stats.idle_slots);
        println!("  Leased slots: {}", pool_stats.leased_slots);
        println!("  Failed slots: {}", pool_stats.failed_slots);
        println!("  Total renders: {}", pool_stats.total_renders);

        if detailed {
            let health_checks = self.service.browser_pool.health_check().await;
            println!("\nDetailed Slot Health:");
            for health in health_checks {
                println!(
                    "  Slot {}: {:?} - Renders: {}, Age: {:?}, Idle: {:?}",
                    health.id, health.status, health.renders_completed, health.age, health.idle_time
                );
            }
        }

        println!("\nRenders in flight: {}", self.service.in_flight());

        Ok(())
    }

    async fn write_result_data(
        &self,
        data: &[u8],
        output: Option<PathBuf>,
    ) -> anyhow::Result<PathBuf> {
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(&path, data).await?;
                Ok(path)
            }
            None => {
                // No explicit target: persist into the save directory
                let store = self.service.output_store();
                store.ensure_dir().await?;
                let extension = if data.starts_with(b"%PDF-") { "pdf" } else { "png" };
                let path = store.write_output(data, extension).await?;
                store.auto_clean(self.config.auto_clean_file_age_secs).await;
                Ok(path)
            }
        }
    }

    pub async fn read_urls_from_file(&self, path: &PathBuf) -> anyhow::Result<Vec<String>> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let urls: Vec<String> = content
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_string())
            .collect();

        Ok(urls)
    }

    pub fn build_page_settings(&self, options: &PageOptions) -> anyhow::Result<PageSettings> {
        let mut settings = self.config.page.clone();

        if let Some(paper) = &options.paper {
            settings.format = parse_paper_format(paper)?;
        }
        if options.landscape {
            settings.orientation = Orientation::Landscape;
        }
        if let Some(margin) = options.margin {
            settings.margins = Margins::uniform(margin);
        }
        if let Some(scale) = options.scale {
            settings.scale = scale;
        }
        if let Some(wait_until) = &options.wait_until {
            settings.wait_until = parse_wait_until(wait_until)?;
        }
        if let Some(delay) = options.delay {
            settings.render_delay = Some(Duration::from_millis(delay));
        }
        if options.no_background {
            settings.print_background = false;
        }

        Ok(settings)
    }

    pub fn generate_filename(&self, source: &str, kind: OutputKind) -> String {
        let sanitized = source
            .replace("https://", "")
            .replace("http://", "")
            .replace('/', "_")
            .replace('?', "_")
            .replace('&', "_")
            .replace('=', "_")
            .replace(':', "_");

        let extension = kind.extension(self.config.screenshot_format);

        format!("{sanitized}.{extension}")
    }
}

pub fn parse_paper_format(name: &str) -> anyhow::Result<PaperFormat> {
    match name.to_ascii_lowercase().as_str() {
        "a3" => Ok(PaperFormat::A3),
        "a4" => Ok(PaperFormat::A4),
        "a5" => Ok(PaperFormat::A5),
        "letter" => Ok(PaperFormat::Letter),
        "legal" => Ok(PaperFormat::Legal),
        "tabloid" => Ok(PaperFormat::Tabloid),
        other => Err(anyhow!("unknown paper format: {other}")),
    }
}

pub fn parse_wait_until(name: &str) -> anyhow::Result<WaitUntil> {
    match name.to_ascii_lowercase().as_str() {
        "load" => Ok(WaitUntil::Load),
        "idle" | "network-idle" => Ok(WaitUntil::NetworkIdle),
        other => Err(anyhow!("unknown wait condition: {other}")),
    }
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}
