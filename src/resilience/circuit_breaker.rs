use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::breaker_event;
use crate::config::{duration_serde, CircuitBreakerConfig};
use crate::error::{GatewayError, Result};

/// The state of one service's circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are failing and not being sent
    Open,
    /// Circuit is partially open, trial requests test recovery
    HalfOpen,
}

/// Per-service circuit
#[derive(Debug, Clone)]
struct ServiceCircuit {
    state: CircuitState,
    /// Consecutive failures while closed
    failure_count: u32,
    /// Successful trial requests while half-open
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    total_requests: u64,
    threshold: u32,
    timeout: Duration,
}

impl ServiceCircuit {
    fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            last_failure_at: None,
            total_requests: 0,
            threshold,
            timeout,
        }
    }

    /// Half-open successes needed to close again
    fn success_threshold(&self) -> u32 {
        self.threshold.div_ceil(2)
    }

    fn stamp_failure(&mut self) {
        self.last_failure = Some(Instant::now());
        self.last_failure_at = Some(Utc::now());
    }

    fn transition(&mut self, service: &str, to: CircuitState) {
        breaker_event!(service, self.state, to, self.failure_count);
        self.state = to;
    }

    fn snapshot(&self, service: &str) -> CircuitSnapshot {
        let retry_after = match (self.state, self.last_failure) {
            (CircuitState::Open, Some(at)) => Some(self.timeout.saturating_sub(at.elapsed())),
            _ => None,
        };

        CircuitSnapshot {
            service: service.to_string(),
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            total_requests: self.total_requests,
            threshold: self.threshold,
            timeout: self.timeout,
            last_failure_at: self.last_failure_at,
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
        }
    }
}

/// Copy of one circuit's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub threshold: u32,
    #[serde(rename = "timeout_ms", with = "duration_serde")]
    pub timeout: Duration,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Time left before an open circuit lets a trial request through
    pub retry_after_ms: Option<u64>,
}

/// Observability figures for one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitMetrics {
    pub service: String,
    pub state: CircuitState,
    pub total_requests: u64,
    pub failure_count: u32,
    pub success_count: u32,
    /// failure_count / total_requests, as a percentage
    pub failure_rate: f64,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Registry of per-service circuit breakers
///
/// ```text
/// Closed → Open:      failure_count >= threshold
/// Open → Half-Open:   is_available() called once timeout has elapsed
/// Half-Open → Closed: ceil(threshold / 2) successes
/// Half-Open → Open:   any failure
/// ```
///
/// Services are created on first touch with the registry defaults, so callers
/// never have to register a backend before using it.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    circuits: RwLock<HashMap<String, ServiceCircuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry and pre-register the configured services
    pub fn new(config: CircuitBreakerConfig) -> Result<Self> {
        config.validate()?;

        let circuits = config
            .services
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    ServiceCircuit::new(config.failure_threshold, config.timeout),
                )
            })
            .collect();

        info!(
            services = config.services.len(),
            threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            "Circuit breaker registry initialized"
        );

        Ok(Self {
            circuits: RwLock::new(circuits),
            config,
        })
    }

    fn default_circuit(&self) -> ServiceCircuit {
        ServiceCircuit::new(self.config.failure_threshold, self.config.timeout)
    }

    /// Register a service with the default threshold and timeout, if absent
    pub async fn register(&self, service: &str) {
        let mut circuits = self.circuits.write().await;
        if !circuits.contains_key(service) {
            circuits.insert(service.to_string(), self.default_circuit());
            debug!(service = %service, "Circuit registered");
        }
    }

    /// Check if a call to the service should be attempted.
    ///
    /// Not a pure query: an open circuit whose timeout has elapsed moves to
    /// half-open here and lets this call through as the trial request.
    pub async fn is_available(&self, service: &str) -> bool {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(service.to_string())
            .or_insert_with(|| self.default_circuit());

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = circuit
                    .last_failure
                    .map(|at| at.elapsed() >= circuit.timeout)
                    .unwrap_or(true);

                if elapsed {
                    circuit.success_count = 0;
                    circuit.transition(service, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of a call to the service
    pub async fn record_result(&self, service: &str, success: bool) {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(service.to_string())
            .or_insert_with(|| self.default_circuit());

        circuit.total_requests += 1;

        match (circuit.state, success) {
            (CircuitState::Closed, true) => {
                // Consecutive-failure semantics
                circuit.failure_count = 0;
            }
            (CircuitState::Closed, false) => {
                circuit.failure_count += 1;
                circuit.stamp_failure();

                if circuit.failure_count >= circuit.threshold {
                    warn!(
                        service = %service,
                        failures = circuit.failure_count,
                        "Circuit opened after consecutive failures"
                    );
                    circuit.transition(service, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true) => {
                circuit.success_count += 1;

                if circuit.success_count >= circuit.success_threshold() {
                    circuit.transition(service, CircuitState::Closed);
                    circuit.failure_count = 0;
                    circuit.success_count = 0;
                }
            }
            (CircuitState::HalfOpen, false) => {
                // Any failure in half-open state opens the circuit again
                circuit.failure_count += 1;
                circuit.success_count = 0;
                circuit.stamp_failure();
                warn!(service = %service, "Circuit re-opened after failure in half-open state");
                circuit.transition(service, CircuitState::Open);
            }
            (CircuitState::Open, true) => {
                // A call that started before the circuit opened
                debug!(service = %service, "Success recorded while circuit is open");
            }
            (CircuitState::Open, false) => {
                circuit.failure_count += 1;
                circuit.stamp_failure();
            }
        }
    }

    pub async fn record_success(&self, service: &str) {
        self.record_result(service, true).await
    }

    pub async fn record_failure(&self, service: &str) {
        self.record_result(service, false).await
    }

    /// Change the failure threshold of one service. Counters are kept.
    pub async fn set_threshold(&self, service: &str, threshold: u32) -> Result<()> {
        if threshold == 0 {
            return Err(GatewayError::Config(format!(
                "failure threshold for {} must be > 0",
                service
            )));
        }

        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(service.to_string())
            .or_insert_with(|| self.default_circuit());
        circuit.threshold = threshold;
        debug!(service = %service, threshold, "Circuit threshold updated");
        Ok(())
    }

    /// Change how long one service's circuit stays open. Counters are kept.
    pub async fn set_timeout(&self, service: &str, timeout: Duration) {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(service.to_string())
            .or_insert_with(|| self.default_circuit());
        circuit.timeout = timeout;
        debug!(
            service = %service,
            timeout_ms = timeout.as_millis() as u64,
            "Circuit timeout updated"
        );
    }

    /// Force the circuit closed and zero its counters, keeping its settings
    pub async fn reset(&self, service: &str) {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(service.to_string())
            .or_insert_with(|| self.default_circuit());
        *circuit = ServiceCircuit::new(circuit.threshold, circuit.timeout);
        info!(service = %service, "Circuit reset");
    }

    pub async fn reset_all(&self) {
        let mut circuits = self.circuits.write().await;
        for circuit in circuits.values_mut() {
            *circuit = ServiceCircuit::new(circuit.threshold, circuit.timeout);
        }
        info!(services = circuits.len(), "All circuits reset");
    }

    /// Snapshot of one service, without registering it
    pub async fn get_state(&self, service: &str) -> Option<CircuitSnapshot> {
        self.circuits
            .read()
            .await
            .get(service)
            .map(|circuit| circuit.snapshot(service))
    }

    /// Snapshots of every known service, sorted by name
    pub async fn get_status(&self) -> Vec<CircuitSnapshot> {
        let circuits = self.circuits.read().await;
        let mut status: Vec<CircuitSnapshot> = circuits
            .iter()
            .map(|(name, circuit)| circuit.snapshot(name))
            .collect();
        status.sort_by(|a, b| a.service.cmp(&b.service));
        status
    }

    pub async fn get_metrics(&self) -> Vec<CircuitMetrics> {
        let circuits = self.circuits.read().await;
        let mut metrics: Vec<CircuitMetrics> = circuits
            .iter()
            .map(|(name, circuit)| CircuitMetrics {
                service: name.clone(),
                state: circuit.state,
                total_requests: circuit.total_requests,
                failure_count: circuit.failure_count,
                success_count: circuit.success_count,
                failure_rate: if circuit.total_requests == 0 {
                    0.0
                } else {
                    circuit.failure_count as f64 / circuit.total_requests as f64 * 100.0
                },
                last_failure_at: circuit.last_failure_at,
            })
            .collect();
        metrics.sort_by(|a, b| a.service.cmp(&b.service));
        metrics
    }

    pub async fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.circuits.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}
