use metrics::{Counter, Gauge, Histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub struct Metrics {
    pub renders_completed: Counter,
    pub renders_failed: Counter,
    pub render_duration: Histogram,
    pub merges_completed: Counter,
    pub browser_pool_utilization: Gauge,
    pub memory_usage: Gauge,
    pub error_count: Counter,
    pub in_flight_renders: Gauge,
    pub browser_restarts: Counter,
    pub navigation_errors: Counter,
    pub timeout_errors: Counter,
    pub retry_count: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            renders_completed: Counter::noop(),
            renders_failed: Counter::noop(),
            render_duration: Histogram::noop(),
            merges_completed: Counter::noop(),
            browser_pool_utilization: Gauge::noop(),
            memory_usage: Gauge::noop(),
            error_count: Counter::noop(),
            in_flight_renders: Gauge::noop(),
            browser_restarts: Counter::noop(),
            navigation_errors: Counter::noop(),
            timeout_errors: Counter::noop(),
            retry_count: Counter::noop(),
        }
    }

    pub fn record_render(&self, duration: Duration, success: bool) {
        if success {
            self.renders_completed.increment(1);
        } else {
            self.renders_failed.increment(1);
        }

        self.render_duration.record(duration.as_secs_f64());
    }

    pub fn record_merge(&self) {
        self.merges_completed.increment(1);
    }

    pub fn record_browser_usage(&self, leased_slots: usize, total_slots: usize) {
        let utilization = (leased_slots as f64 / total_slots as f64) * 100.0;
        self.browser_pool_utilization.set(utilization);
    }

    pub fn record_memory_usage(&self, bytes: usize) {
        self.memory_usage.set(bytes as f64);
    }

    pub fn record_error(&self, error_type: &str) {
        self.error_count.increment(1);

        match error_type {
            "navigation" => self.navigation_errors.increment(1),
            "timeout" => self.timeout_errors.increment(1),
            _ => {}
        }
    }

    pub fn record_retry(&self) {
        self.retry_count.increment(1);
    }

    pub fn record_browser_restart(&self) {
        self.browser_restarts.increment(1);
    }

    pub fn set_in_flight(&self, count: usize) {
        self.in_flight_renders.set(count as f64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MetricsCollector {
    metrics: Arc<Metrics>,
    start_time: Instant,
    collection_interval: Duration,
}

impl MetricsCollector {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            start_time: Instant::now(),
            collection_interval: Duration::from_secs(10),
        }
    }

    pub async fn start_collection(&self) {
        let metrics = self.metrics.clone();
        let interval = self.collection_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);

            loop {
                interval_timer.tick().await;

                if let Ok(memory) = Self::get_memory_usage() {
                    metrics.record_memory_usage(memory);
                }

                info!("Metrics collection completed");
            }
        });
    }

    fn get_memory_usage() -> Result<usize, Box<dyn std::error::Error>> {
        // Resident set size from /proc/self/status (Linux)
        if let Ok(content) = std::fs::read_to_string("/proc/self/status") {
            for line in content.lines() {
                if line.starts_with("VmRSS:") {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if parts.len() >= 2 {
                        if let Ok(kb) = parts[1].parse::<usize>() {
                            return Ok(kb * 1024);
                        }
                    }
                }
            }
        }

        Ok(0)
    }

    pub fn get_uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

pub struct PrometheusExporter {
    port: u16,
}

impl PrometheusExporter {
    pub fn new(_metrics: Arc<Metrics>, port: u16) -> Self {
        Self { port }
    }

    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();

        metrics::set_boxed_recorder(Box::new(recorder))?;

        info!("Prometheus recorder installed (metrics port {})", self.port);

        Ok(())
    }
}
