// src/gateway.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheManager, DetailedCacheStats};
use crate::config::GatewayConfig;
use crate::discovery::{HealthCheckStats, ServiceDiscovery, ServiceRecord};
use crate::error::{GatewayError, Result};
use crate::resilience::{CircuitBreakerRegistry, CircuitMetrics};

/// Everything an operator status endpoint needs, in one serializable value
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub generated_at: DateTime<Utc>,
    pub cache: DetailedCacheStats,
    pub circuits: Vec<CircuitMetrics>,
    pub services: Vec<ServiceRecord>,
    pub health: HealthCheckStats,
}

/// Request path shared by all proxied calls:
/// cache lookup, circuit check, endpoint resolution, call, outcome recording.
#[derive(Debug)]
pub struct Gateway<V> {
    cache: Arc<CacheManager<V>>,
    breakers: Arc<CircuitBreakerRegistry>,
    discovery: Arc<ServiceDiscovery>,
}

impl<V> Gateway<V>
where
    V: Serialize + Clone + Send + Sync + 'static,
{
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let cache = CacheManager::new(config.cache)?;
        let breakers = CircuitBreakerRegistry::new(config.circuit_breaker)?;
        let discovery = ServiceDiscovery::new(config.discovery)?;

        info!("Gateway initialized");
        Ok(Self::from_parts(
            Arc::new(cache),
            Arc::new(breakers),
            Arc::new(discovery),
        ))
    }

    /// Assemble a gateway from already built components
    pub fn from_parts(
        cache: Arc<CacheManager<V>>,
        breakers: Arc<CircuitBreakerRegistry>,
        discovery: Arc<ServiceDiscovery>,
    ) -> Self {
        Self {
            cache,
            breakers,
            discovery,
        }
    }

    /// Route one call to `service`.
    ///
    /// A cached value for `cache_key` is returned without touching the
    /// backend. Otherwise the call only runs when the circuit allows it and
    /// the service has a registered URL; its outcome is always reported to
    /// the circuit, and a successful value is cached under `cache_key`.
    #[instrument(skip_all, fields(service = %service))]
    pub async fn proxy<F, Fut>(&self, service: &str, cache_key: Option<&str>, call: F) -> Result<V>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(key) = cache_key {
            if let Some(value) = self.cache.get(key) {
                debug!(key = %key, "Served from cache");
                return Ok(value);
            }
        }

        if !self.breakers.is_available(service).await {
            warn!("Circuit open, rejecting call");
            return Err(GatewayError::ServiceUnavailable(service.to_string()));
        }

        let base_url = match self.discovery.get_service_url(service).await {
            Some(url) => url,
            None => {
                warn!("No URL registered for service");
                return Err(GatewayError::UnknownService(service.to_string()));
            }
        };

        let result = call(base_url).await;
        self.breakers.record_result(service, result.is_ok()).await;

        match &result {
            Ok(value) => {
                if let Some(key) = cache_key {
                    self.cache.set(key, value.clone());
                }
            }
            Err(e) => warn!(error = %e, "Upstream call failed"),
        }

        result
    }

    pub async fn status(&self) -> GatewayStatus {
        GatewayStatus {
            generated_at: Utc::now(),
            cache: self.cache.get_detailed_stats(),
            circuits: self.breakers.get_metrics().await,
            services: self.discovery.get_all_services().await,
            health: self.discovery.get_health_check_stats().await,
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager<V>> {
        &self.cache
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn discovery(&self) -> &Arc<ServiceDiscovery> {
        &self.discovery
    }
}

impl<V> Gateway<V> {
    /// Stop the cache sweep and the health checks
    pub fn shutdown(&self) {
        self.cache.stop();
        self.discovery.stop_health_checks();
        info!("Gateway background tasks stopped");
    }
}
