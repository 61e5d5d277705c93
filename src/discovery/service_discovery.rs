use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::{self, JoinHandle};
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{duration_serde, DiscoveryConfig};
use crate::discovery::probe::{HealthProbe, HealthReport, HttpHealthProbe};
use crate::error::{ProbeError, Result};

/// Health of a service as of the last completed sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    /// Non-2xx answer, timeout or transport error
    Unhealthy,
    /// Not probed since it was registered or its URL changed
    Unknown,
}

/// Directory entry for one backend service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    pub name: String,
    pub url: String,
    pub status: ServiceStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
    pub uptime: Option<f64>,
    pub version: Option<String>,
    pub endpoints: Option<serde_json::Value>,
    /// Why the last probe failed
    pub last_error: Option<String>,
}

impl ServiceRecord {
    fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            status: ServiceStatus::Unknown,
            last_check: None,
            response_time_ms: None,
            uptime: None,
            version: None,
            endpoints: None,
            last_error: None,
        }
    }

    fn mark_healthy(&mut self, report: HealthReport, elapsed: Duration, at: DateTime<Utc>) {
        self.status = ServiceStatus::Healthy;
        self.last_check = Some(at);
        self.response_time_ms = Some(elapsed.as_millis() as u64);
        self.uptime = report.uptime;
        self.version = report.version;
        self.endpoints = report.endpoints;
        self.last_error = None;
    }

    fn mark_unhealthy(&mut self, reason: String, at: DateTime<Utc>) {
        self.status = ServiceStatus::Unhealthy;
        self.last_check = Some(at);
        self.response_time_ms = None;
        self.last_error = Some(reason);
    }
}

/// Aggregate view over the directory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckStats {
    pub total_services: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    /// Healthy services as a percentage of all services
    pub health_ratio: f64,
    #[serde(rename = "check_interval_ms", with = "duration_serde")]
    pub check_interval: Duration,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub monitoring: bool,
}

enum ProbeOutcome {
    Healthy {
        report: HealthReport,
        elapsed: Duration,
    },
    Unhealthy(String),
}

#[derive(Debug)]
struct DiscoveryInner {
    services: RwLock<HashMap<String, ServiceRecord>>,
    last_sweep: RwLock<Option<DateTime<Utc>>>,
    probe: Arc<dyn HealthProbe>,
    config: DiscoveryConfig,
}

impl DiscoveryInner {
    async fn sweep(&self) -> Vec<ServiceRecord> {
        let sweep_id = Uuid::new_v4();
        let targets: Vec<(String, String)> = self
            .services
            .read()
            .await
            .values()
            .map(|record| (record.name.clone(), record.url.clone()))
            .collect();

        debug!(%sweep_id, services = targets.len(), "Starting health sweep");

        // One task per service; a panicking or hanging probe only affects itself
        let timeout = self.config.check_timeout;
        let handles: Vec<JoinHandle<ProbeOutcome>> = targets
            .iter()
            .map(|(_, url)| {
                let probe = Arc::clone(&self.probe);
                let url = url.clone();
                task::spawn(async move {
                    let started = Instant::now();
                    match time::timeout(timeout, probe.probe(&url)).await {
                        Ok(Ok(report)) => ProbeOutcome::Healthy {
                            report,
                            elapsed: started.elapsed(),
                        },
                        Ok(Err(e)) => ProbeOutcome::Unhealthy(e.to_string()),
                        Err(_) => ProbeOutcome::Unhealthy(
                            ProbeError::Timeout(timeout.as_millis() as u64).to_string(),
                        ),
                    }
                })
            })
            .collect();

        let outcomes = join_all(handles).await;
        let now = Utc::now();

        let mut services = self.services.write().await;
        for ((name, url), outcome) in targets.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|e| {
                error!(service = %name, error = %e, "Health probe task failed");
                ProbeOutcome::Unhealthy(format!("probe task failed: {}", e))
            });

            // Removed or re-pointed while the probe was in flight
            let record = match services.get_mut(&name) {
                Some(record) if record.url == url => record,
                _ => {
                    debug!(service = %name, "Discarding stale health result");
                    continue;
                }
            };

            let previous = record.status;
            match outcome {
                ProbeOutcome::Healthy { report, elapsed } => {
                    record.mark_healthy(report, elapsed, now);
                    if previous != ServiceStatus::Healthy {
                        info!(service = %name, response_time_ms = record.response_time_ms, "Service is now healthy");
                    }
                }
                ProbeOutcome::Unhealthy(reason) => {
                    warn!(service = %name, url = %url, error = %reason, "Health check failed");
                    record.mark_unhealthy(reason, now);
                    if previous != ServiceStatus::Unhealthy {
                        warn!(service = %name, "Service is now unhealthy");
                    }
                }
            }
        }

        let snapshot = sorted(services.values().cloned().collect());
        drop(services);
        *self.last_sweep.write().await = Some(now);

        let healthy = snapshot
            .iter()
            .filter(|r| r.status == ServiceStatus::Healthy)
            .count();
        info!(
            %sweep_id,
            healthy,
            total = snapshot.len(),
            "Health sweep completed"
        );
        snapshot
    }
}

fn sorted(mut records: Vec<ServiceRecord>) -> Vec<ServiceRecord> {
    records.sort_by(|a, b| a.name.cmp(&b.name));
    records
}

/// Directory of backend services with periodic health sweeps
///
/// Status values only change when a sweep completes, either from the
/// background loop (`start_health_checks`) or from `check_all_services`.
/// Queries such as `is_service_healthy` never probe on their own.
#[derive(Debug)]
pub struct ServiceDiscovery {
    inner: Arc<DiscoveryInner>,
    /// Cancel flag for the health check task
    cancel_flag: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceDiscovery {
    /// Create a directory probing over HTTP
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let probe = HttpHealthProbe::new(&config)?;
        Self::with_probe(config, Arc::new(probe))
    }

    /// Create a directory with a custom probe
    pub fn with_probe(config: DiscoveryConfig, probe: Arc<dyn HealthProbe>) -> Result<Self> {
        config.validate()?;

        let services = config
            .services
            .iter()
            .map(|s| (s.name.clone(), ServiceRecord::new(&s.name, &s.url)))
            .collect();

        info!(
            services = config.services.len(),
            interval_ms = config.check_interval.as_millis() as u64,
            "Service discovery initialized"
        );

        Ok(Self {
            inner: Arc::new(DiscoveryInner {
                services: RwLock::new(services),
                last_sweep: RwLock::new(None),
                probe,
                config,
            }),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        })
    }

    /// Start the background sweep loop. The first sweep runs immediately.
    ///
    /// Must be called from within a tokio runtime. Calling it while the loop
    /// is already running does nothing.
    pub fn start_health_checks(&self) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Health checks already running");
            return;
        }

        self.cancel_flag.store(false, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let cancel_flag = Arc::clone(&self.cancel_flag);
        let interval = self.inner.config.check_interval;

        info!(interval_ms = interval.as_millis() as u64, "Starting health checks");

        *slot = Some(task::spawn(async move {
            let mut interval_timer = time::interval(interval);

            loop {
                interval_timer.tick().await;

                // Check if we should stop
                if cancel_flag.load(Ordering::SeqCst) {
                    break;
                }

                inner.sweep().await;
            }

            debug!("Health check task stopped");
        }));
    }

    /// Stop the background sweep loop
    pub fn stop_health_checks(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Health checks stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run a sweep now and return the resulting directory
    pub async fn check_all_services(&self) -> Vec<ServiceRecord> {
        self.inner.sweep().await
    }

    pub async fn get_all_services(&self) -> Vec<ServiceRecord> {
        sorted(self.inner.services.read().await.values().cloned().collect())
    }

    pub async fn get_service_info(&self, name: &str) -> Option<ServiceRecord> {
        self.inner.services.read().await.get(name).cloned()
    }

    pub async fn get_service_url(&self, name: &str) -> Option<String> {
        self.inner
            .services
            .read()
            .await
            .get(name)
            .map(|record| record.url.clone())
    }

    pub async fn is_service_healthy(&self, name: &str) -> bool {
        self.inner
            .services
            .read()
            .await
            .get(name)
            .is_some_and(|record| record.status == ServiceStatus::Healthy)
    }

    /// Names of services whose last probe succeeded
    pub async fn get_healthy_services(&self) -> Vec<String> {
        self.names_with(ServiceStatus::Healthy).await
    }

    /// Names of services whose last probe failed (unknown ones are excluded)
    pub async fn get_unhealthy_services(&self) -> Vec<String> {
        self.names_with(ServiceStatus::Unhealthy).await
    }

    async fn names_with(&self, status: ServiceStatus) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .services
            .read()
            .await
            .values()
            .filter(|record| record.status == status)
            .map(|record| record.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Register a service, replacing any existing entry with the same name
    pub async fn add_service(&self, name: &str, url: &str) {
        let previous = self
            .inner
            .services
            .write()
            .await
            .insert(name.to_string(), ServiceRecord::new(name, url));
        match previous {
            Some(old) => info!(service = %name, old_url = %old.url, url = %url, "Service re-registered"),
            None => info!(service = %name, url = %url, "Service registered"),
        }
    }

    pub async fn remove_service(&self, name: &str) -> bool {
        let removed = self.inner.services.write().await.remove(name).is_some();
        if removed {
            info!(service = %name, "Service removed");
        }
        removed
    }

    /// Point a service at a new URL. Its status goes back to unknown until the
    /// next sweep.
    pub async fn update_service_url(&self, name: &str, url: &str) -> bool {
        let mut services = self.inner.services.write().await;
        match services.get_mut(name) {
            Some(record) => {
                *record = ServiceRecord::new(name, url);
                info!(service = %name, url = %url, "Service URL updated");
                true
            }
            None => {
                warn!(service = %name, "Cannot update URL of unknown service");
                false
            }
        }
    }

    pub async fn get_health_check_stats(&self) -> HealthCheckStats {
        let (total, healthy, unhealthy) = {
            let services = self.inner.services.read().await;
            let count = |status: ServiceStatus| services.values().filter(|r| r.status == status).count();
            (
                services.len(),
                count(ServiceStatus::Healthy),
                count(ServiceStatus::Unhealthy),
            )
        };

        HealthCheckStats {
            total_services: total,
            healthy,
            unhealthy,
            unknown: total - healthy - unhealthy,
            health_ratio: if total == 0 {
                0.0
            } else {
                healthy as f64 / total as f64 * 100.0
            },
            check_interval: self.inner.config.check_interval,
            last_sweep_at: *self.inner.last_sweep.read().await,
            monitoring: self.is_monitoring(),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }
}

impl Drop for ServiceDiscovery {
    fn drop(&mut self) {
        self.stop_health_checks();
    }
}
