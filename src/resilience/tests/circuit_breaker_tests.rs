// src/resilience/tests/circuit_breaker_tests.rs

use std::time::Duration;
use tokio::time;
use tokio_test::{assert_err, assert_ok};

use super::utils::{create_registry, open_circuit};
use crate::config::CircuitBreakerConfig;
use crate::error::GatewayError;
use crate::resilience::{CircuitBreakerRegistry, CircuitState};

async fn state_of(registry: &CircuitBreakerRegistry, service: &str) -> CircuitState {
    registry
        .get_state(service)
        .await
        .expect("service should be registered")
        .state
}

#[tokio::test]
async fn test_initial_state_is_closed() {
    let registry = create_registry(5, Duration::from_secs(60));

    assert!(registry.is_available("svc").await);
    assert_eq!(state_of(&registry, "svc").await, CircuitState::Closed);
}

#[tokio::test]
async fn test_known_services_are_pre_registered() {
    let registry = assert_ok!(CircuitBreakerRegistry::new(CircuitBreakerConfig::default()));

    let services = registry.services().await;
    assert!(services.contains(&"user-service".to_string()));
    assert!(services.contains(&"order-service".to_string()));

    let snapshot = registry.get_state("user-service").await.unwrap();
    assert_eq!(snapshot.threshold, 5);
    assert_eq!(snapshot.timeout, Duration::from_millis(60_000));
    assert_eq!(snapshot.total_requests, 0);
}

#[tokio::test]
async fn test_unknown_service_is_lazily_registered() {
    let registry = assert_ok!(CircuitBreakerRegistry::new(CircuitBreakerConfig::default()));
    assert!(registry.get_state("brand-new").await.is_none());

    registry.record_failure("brand-new").await;

    let snapshot = registry.get_state("brand-new").await.unwrap();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 1);
    assert_eq!(snapshot.threshold, 5);
}

#[tokio::test]
async fn test_circuit_opens_after_threshold_failures() {
    let registry = create_registry(3, Duration::from_secs(1));

    registry.record_failure("svc").await;
    registry.record_failure("svc").await;
    assert_eq!(state_of(&registry, "svc").await, CircuitState::Closed);
    assert!(registry.is_available("svc").await);

    // This should open the circuit
    registry.record_failure("svc").await;

    assert_eq!(
        state_of(&registry, "svc").await,
        CircuitState::Open,
        "Circuit should be Open after 3 failures"
    );
    assert!(!registry.is_available("svc").await);

    let snapshot = registry.get_state("svc").await.unwrap();
    assert!(snapshot.last_failure_at.is_some());
    assert!(snapshot.retry_after_ms.is_some());
}

#[tokio::test]
async fn test_success_in_closed_state_resets_failure_count() {
    let registry = create_registry(3, Duration::from_secs(1));

    registry.record_failure("svc").await;
    registry.record_failure("svc").await;
    registry.record_success("svc").await;
    assert_eq!(registry.get_state("svc").await.unwrap().failure_count, 0);

    // Count restarts from zero
    registry.record_failure("svc").await;
    registry.record_failure("svc").await;
    assert_eq!(state_of(&registry, "svc").await, CircuitState::Closed);

    registry.record_failure("svc").await;
    assert_eq!(state_of(&registry, "svc").await, CircuitState::Open);
}

#[tokio::test]
async fn test_open_circuit_stays_open_until_timeout() {
    let registry = create_registry(3, Duration::from_millis(200));
    open_circuit(&registry, "svc", 3).await;

    time::sleep(Duration::from_millis(50)).await;
    assert!(!registry.is_available("svc").await);
    assert_eq!(state_of(&registry, "svc").await, CircuitState::Open);
}

#[tokio::test]
async fn test_availability_check_moves_to_half_open() {
    let registry = create_registry(3, Duration::from_millis(100));
    open_circuit(&registry, "svc", 3).await;
    assert!(!registry.is_available("svc").await);

    time::sleep(Duration::from_millis(150)).await;

    // Still Open until someone asks
    assert_eq!(state_of(&registry, "svc").await, CircuitState::Open);

    assert!(registry.is_available("svc").await, "trial request should be allowed");
    assert_eq!(state_of(&registry, "svc").await, CircuitState::HalfOpen);
    // Half-open keeps letting trial requests through
    assert!(registry.is_available("svc").await);
}

#[tokio::test]
async fn test_half_open_closes_after_half_threshold_successes() {
    let registry = create_registry(3, Duration::from_millis(100));
    open_circuit(&registry, "svc", 3).await;
    time::sleep(Duration::from_millis(150)).await;
    assert!(registry.is_available("svc").await);

    // ceil(3 / 2) == 2
    registry.record_success("svc").await;
    assert_eq!(
        state_of(&registry, "svc").await,
        CircuitState::HalfOpen,
        "Still in HalfOpen after first success"
    );

    registry.record_success("svc").await;

    let snapshot = registry.get_state("svc").await.unwrap();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.success_count, 0);
}

#[tokio::test]
async fn test_failure_in_half_open_reopens_immediately() {
    let registry = create_registry(3, Duration::from_millis(100));
    open_circuit(&registry, "svc", 3).await;
    let opened_at = registry.get_state("svc").await.unwrap().last_failure_at.unwrap();

    time::sleep(Duration::from_millis(150)).await;
    assert!(registry.is_available("svc").await);
    registry.record_success("svc").await;

    registry.record_failure("svc").await;

    let snapshot = registry.get_state("svc").await.unwrap();
    assert_eq!(snapshot.state, CircuitState::Open);
    assert_eq!(snapshot.success_count, 0);
    assert!(snapshot.last_failure_at.unwrap() > opened_at);
    assert!(!registry.is_available("svc").await);
}

#[tokio::test]
async fn test_late_failure_while_open_extends_timeout() {
    let registry = create_registry(2, Duration::from_millis(150));
    open_circuit(&registry, "svc", 2).await;

    time::sleep(Duration::from_millis(100)).await;
    // A call that was already in flight fails
    registry.record_failure("svc").await;
    time::sleep(Duration::from_millis(100)).await;

    assert!(!registry.is_available("svc").await);
    assert_eq!(registry.get_state("svc").await.unwrap().failure_count, 3);
}

#[tokio::test]
async fn test_services_are_independent() {
    let registry = create_registry(2, Duration::from_secs(60));
    open_circuit(&registry, "broken", 2).await;
    registry.record_success("healthy").await;

    assert!(!registry.is_available("broken").await);
    assert!(registry.is_available("healthy").await);
}

#[tokio::test]
async fn test_runtime_threshold_and_timeout_keep_counters() {
    let registry = create_registry(5, Duration::from_secs(60));
    registry.record_failure("svc").await;
    registry.record_failure("svc").await;

    assert_ok!(registry.set_threshold("svc", 3).await);
    registry.set_timeout("svc", Duration::from_millis(50)).await;

    let snapshot = registry.get_state("svc").await.unwrap();
    assert_eq!(snapshot.failure_count, 2);
    assert_eq!(snapshot.threshold, 3);
    assert_eq!(snapshot.timeout, Duration::from_millis(50));

    registry.record_failure("svc").await;
    assert_eq!(state_of(&registry, "svc").await, CircuitState::Open);

    time::sleep(Duration::from_millis(80)).await;
    assert!(registry.is_available("svc").await);

    // Other services keep the defaults
    registry.register("other").await;
    assert_eq!(registry.get_state("other").await.unwrap().threshold, 5);
}

#[tokio::test]
async fn test_zero_threshold_is_rejected() {
    let registry = create_registry(5, Duration::from_secs(60));

    let err = assert_err!(registry.set_threshold("svc", 0).await);
    assert!(matches!(err, GatewayError::Config(_)));

    let config = CircuitBreakerConfig {
        failure_threshold: 0,
        ..CircuitBreakerConfig::default()
    };
    assert!(CircuitBreakerRegistry::new(config).is_err());
}

#[tokio::test]
async fn test_reset_force_closes() {
    let registry = create_registry(2, Duration::from_secs(60));
    assert_ok!(registry.set_threshold("svc", 4).await);
    open_circuit(&registry, "svc", 4).await;
    assert!(!registry.is_available("svc").await);

    registry.reset("svc").await;

    let snapshot = registry.get_state("svc").await.unwrap();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.total_requests, 0);
    assert!(snapshot.last_failure_at.is_none());
    assert_eq!(snapshot.threshold, 4, "settings survive a reset");
    assert!(registry.is_available("svc").await);
}

#[tokio::test]
async fn test_reset_all() {
    let registry = create_registry(1, Duration::from_secs(60));
    registry.record_failure("a").await;
    registry.record_failure("b").await;

    registry.reset_all().await;

    assert!(registry.is_available("a").await);
    assert!(registry.is_available("b").await);
}

#[tokio::test]
async fn test_metrics_failure_rate() {
    let registry = create_registry(10, Duration::from_secs(60));
    registry.record_success("svc").await;
    registry.record_success("svc").await;
    registry.record_failure("svc").await;
    registry.record_failure("svc").await;
    registry.register("idle").await;

    let metrics = registry.get_metrics().await;
    assert_eq!(metrics.len(), 2);

    let idle = &metrics[0];
    assert_eq!(idle.service, "idle");
    assert_eq!(idle.failure_rate, 0.0);

    let svc = &metrics[1];
    assert_eq!(svc.total_requests, 4);
    assert_eq!(svc.failure_count, 2);
    assert!((svc.failure_rate - 50.0).abs() < 1e-9);
    assert_eq!(svc.state, CircuitState::Closed);

    let status = registry.get_status().await;
    assert_eq!(status.len(), 2);
    assert_eq!(status[1].service, "svc");
}
