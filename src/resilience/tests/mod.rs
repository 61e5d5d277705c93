// src/resilience/tests/mod.rs
//! Tests for circuit breaking

mod circuit_breaker_tests;

// Common test utilities for resilience testing
pub(crate) mod utils {
    use std::time::Duration;

    use crate::config::CircuitBreakerConfig;
    use crate::resilience::CircuitBreakerRegistry;

    /// Registry with no pre-registered services
    pub fn create_registry(threshold: u32, timeout: Duration) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout,
            services: Vec::new(),
        })
        .expect("valid circuit breaker config")
    }

    /// Drive a service's circuit to Open with `threshold` failures
    pub async fn open_circuit(registry: &CircuitBreakerRegistry, service: &str, threshold: u32) {
        for _ in 0..threshold {
            registry.record_failure(service).await;
        }
    }
}
