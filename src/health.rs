use crate::{BrowserPool, Metrics, RenderService, SlotStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub overall: HealthLevel,
    pub performance: HealthLevel,
    pub resources: HealthLevel,
    pub errors: HealthLevel,
    pub timestamp: std::time::SystemTime,
}

#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub max_avg_duration: Duration,
    pub max_error_rate: f64,
    pub max_memory_usage: usize,
    pub min_available_browsers: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_avg_duration: Duration::from_secs(30),
            max_error_rate: 0.05, // 5%
            max_memory_usage: 1024 * 1024 * 1024, // 1GB
            min_available_browsers: 1,
        }
    }
}

pub struct SystemHealthChecker {
    browser_pool: Arc<BrowserPool>,
    service: Arc<RenderService>,
    thresholds: HealthThresholds,
    last_check: Option<Instant>,
}

impl SystemHealthChecker {
    pub fn new(
        browser_pool: Arc<BrowserPool>,
        service: Arc<RenderService>,
        _metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            browser_pool,
            service,
            thresholds: HealthThresholds::default(),
            last_check: None,
        }
    }

    pub async fn check_system_health(&mut self) -> HealthStatus {
        let start_time = Instant::now();

        let browser_health = self.check_browser_pool_health().await;
        let service_health = self.check_service_health().await;
        let resource_health = self.check_resource_health().await;

        let overall_health = self.determine_overall_health(&[
            browser_health.clone(),
            service_health.clone(),
            resource_health.clone(),
        ]);

        let check_duration = start_time.elapsed();
        self.last_check = Some(start_time);

        info!(
            "Health check completed in {:?}: {:?}",
            check_duration, overall_health
        );

        HealthStatus {
            overall: overall_health,
            performance: service_health,
            resources: resource_health,
            errors: browser_health,
            timestamp: std::time::SystemTime::now(),
        }
    }

    async fn check_browser_pool_health(&self) -> HealthLevel {
        let stats = self.browser_pool.get_stats().await;

        let working_slots = stats.total_slots - stats.failed_slots;
        if working_slots < self.thresholds.min_available_browsers {
            warn!(
                "Browser pool health critical: only {} working slots",
                working_slots
            );
            return HealthLevel::Critical;
        }

        let failure_rate = if stats.total_slots > 0 {
            stats.failed_slots as f64 / stats.total_slots as f64
        } else {
            0.0
        };

        if failure_rate > 0.5 {
            error!(
                "Browser pool health critical: failure rate {:.2}%",
                failure_rate * 100.0
            );
            return HealthLevel::Critical;
        } else if failure_rate > 0.2 {
            warn!(
                "Browser pool health warning: failure rate {:.2}%",
                failure_rate * 100.0
            );
            return HealthLevel::Warning;
        }

        let utilization = if stats.total_slots > 0 {
            stats.leased_slots as f64 / stats.total_slots as f64
        } else {
            0.0
        };

        if utilization > 0.9 {
            warn!("Browser pool high utilization: {:.2}%", utilization * 100.0);
            return HealthLevel::Warning;
        }

        HealthLevel::Healthy
    }

    async fn check_service_health(&self) -> HealthLevel {
        let in_flight = self.service.in_flight();
        let max_concurrent = self.service.max_concurrent();

        if in_flight >= max_concurrent {
            error!("Service health critical: {} renders in flight", in_flight);
            return HealthLevel::Critical;
        } else if in_flight * 10 >= max_concurrent * 9 {
            warn!("Service health warning: {} renders in flight", in_flight);
            return HealthLevel::Warning;
        }

        HealthLevel::Healthy
    }

    async fn check_resource_health(&self) -> HealthLevel {
        if let Ok(memory_usage) = self.get_memory_usage() {
            if memory_usage > self.thresholds.max_memory_usage {
                error!(
                    "Resource health critical: memory usage {} MB",
                    memory_usage / 1024 / 1024
                );
                return HealthLevel::Critical;
            } else if memory_usage > self.thresholds.max_memory_usage * 8 / 10 {
                warn!(
                    "Resource health warning: memory usage {} MB",
                    memory_usage / 1024 / 1024
                );
                return HealthLevel::Warning;
            }
        }

        HealthLevel::Healthy
    }

    fn determine_overall_health(&self, healths: &[HealthLevel]) -> HealthLevel {
        if healths.contains(&HealthLevel::Critical) {
            HealthLevel::Critical
        } else if healths.contains(&HealthLevel::Warning) {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        }
    }

    fn get_memory_usage(&self) -> Result<usize, Box<dyn std::error::Error>> {
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

    async fn handle_critical_health(&self) {
        warn!("Handling critical health status");

        // Relaunch failed browser slots
        let health_checks = self.browser_pool.health_check().await;
        for health in health_checks {
            if health.status == SlotStatus::Failed {
                warn!("Relaunching failed browser slot {}", health.id);
                if let Err(e) = self.browser_pool.restart_slot(health.id).await {
                    error!("Failed to relaunch browser slot {}: {}", health.id, e);
                }
            }
        }
    }
}

pub struct HealthMonitor {
    checker: SystemHealthChecker,
    alerts: Vec<HealthAlert>,
}

impl HealthMonitor {
    pub fn new(
        browser_pool: Arc<BrowserPool>,
        service: Arc<RenderService>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            checker: SystemHealthChecker::new(browser_pool, service, metrics),
            alerts: Vec::new(),
        }
    }

    pub async fn start_monitoring(&mut self, interval: Duration) {
        // First check after one full interval, not immediately
        let start = tokio::time::Instant::now() + interval;
        let mut interval_timer = tokio::time::interval_at(start, interval);

        loop {
            interval_timer.tick().await;

            let health_status = self.checker.check_system_health().await;

            if health_status.overall == HealthLevel::Critical {
                self.checker.handle_critical_health().await;
            }

            self.check_alerts(&health_status).await;
            self.cleanup_old_alerts();
        }
    }

    async fn check_alerts(&mut self, health_status: &HealthStatus) {
        if health_status.overall == HealthLevel::Critical {
            self.create_alert(AlertType::Critical, "System health is critical".to_string());
        }

        if health_status.resources == HealthLevel::Critical {
            self.create_alert(
                AlertType::ResourceExhaustion,
                "Resource usage is critical".to_string(),
            );
        }

        if health_status.performance == HealthLevel::Critical {
            self.create_alert(
                AlertType::PerformanceDegradation,
                "Performance is critically degraded".to_string(),
            );
        }
    }

    fn create_alert(&mut self, alert_type: AlertType, message: String) {
        let alert = HealthAlert {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type,
            message,
            timestamp: std::time::SystemTime::now(),
            acknowledged: false,
        };

        error!("Health Alert [{}]: {}", alert.alert_type, alert.message);
        self.alerts.push(alert);
    }

    fn cleanup_old_alerts(&mut self) {
        let cutoff = std::time::SystemTime::now() - Duration::from_secs(24 * 60 * 60);
        self.alerts.retain(|alert| alert.timestamp > cutoff);
    }

    pub fn get_active_alerts(&self) -> Vec<&HealthAlert> {
        self.alerts.iter().filter(|a| !a.acknowledged).collect()
    }

    pub fn acknowledge_alert(&mut self, alert_id: &str) {
        if let Some(alert) = self.alerts.iter_mut().find(|a| a.id == alert_id) {
            alert.acknowledged = true;
            info!("Alert {} acknowledged", alert_id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthAlert {
    pub id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub timestamp: std::time::SystemTime,
    pub acknowledged: bool,
}

#[derive(Debug, Clone)]
pub enum AlertType {
    Critical,
    ResourceExhaustion,
    PerformanceDegradation,
    BrowserPoolFailure,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Critical => write!(f, "CRITICAL"),
            AlertType::ResourceExhaustion => write!(f, "RESOURCE_EXHAUSTION"),
            AlertType::PerformanceDegradation => write!(f, "PERFORMANCE_DEGRADATION"),
            AlertType::BrowserPoolFailure => write!(f, "BROWSER_POOL_FAILURE"),
        }
    }
}
