// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GatewayError, Result};

/// Backends known at build time: (name, url env var, localhost fallback)
pub const DEFAULT_SERVICES: &[(&str, &str, &str)] = &[
    ("user-service", "USER_SERVICE_URL", "http://localhost:3001"),
    ("product-service", "PRODUCT_SERVICE_URL", "http://localhost:3002"),
    ("order-service", "ORDER_SERVICE_URL", "http://localhost:3003"),
    (
        "notification-service",
        "NOTIFICATION_SERVICE_URL",
        "http://localhost:3004",
    ),
];

/// Configuration for the in-memory response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Byte budget for the whole cache
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Maximum number of entries to store
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// TTL applied by `set` when no explicit TTL is given
    #[serde(default = "default_ttl", with = "duration_serde")]
    pub default_ttl: Duration,

    /// How often the background task sweeps expired entries
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,

    /// Whether to use a background task for expiration
    #[serde(default = "default_use_background_task")]
    pub use_background_task: bool,
}

fn default_max_size() -> usize {
    100 * 1024 * 1024
}

fn default_max_entries() -> usize {
    1000
}

fn default_ttl() -> Duration {
    Duration::from_millis(300_000)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_use_background_task() -> bool {
    true
}

// serde defaults only apply when deserializing, so Default mirrors them by hand
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_entries: default_max_entries(),
            default_ttl: default_ttl(),
            cleanup_interval: default_cleanup_interval(),
            use_background_task: default_use_background_task(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(GatewayError::Config("cache max_size must be > 0".into()));
        }
        if self.max_entries == 0 {
            return Err(GatewayError::Config("cache max_entries must be > 0".into()));
        }
        if self.use_background_task && self.cleanup_interval.is_zero() {
            return Err(GatewayError::Config(
                "cache cleanup_interval must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the per-service circuit breakers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before a circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long a circuit stays open before a trial request is let through
    #[serde(default = "default_breaker_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Services registered eagerly at construction
    #[serde(default = "default_service_names")]
    pub services: Vec<String>,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_timeout() -> Duration {
    Duration::from_millis(60_000)
}

fn default_service_names() -> Vec<String> {
    DEFAULT_SERVICES
        .iter()
        .map(|(name, _, _)| name.to_string())
        .collect()
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout: default_breaker_timeout(),
            services: default_service_names(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(GatewayError::Config(
                "circuit breaker failure_threshold must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// A backend service and its base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
}

/// Configuration for service discovery and health sweeps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Delay between two health sweeps
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// Per-probe timeout
    #[serde(default = "default_check_timeout", with = "duration_serde")]
    pub check_timeout: Duration,

    /// Path appended to each base URL
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// User-Agent header sent with every probe
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_services")]
    pub services: Vec<ServiceConfig>,
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_user_agent() -> String {
    "API-Gateway-Health-Check/1.0".to_string()
}

fn default_services() -> Vec<ServiceConfig> {
    DEFAULT_SERVICES
        .iter()
        .map(|(name, _, url)| ServiceConfig {
            name: name.to_string(),
            url: url.to_string(),
        })
        .collect()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            check_timeout: default_check_timeout(),
            health_path: default_health_path(),
            user_agent: default_user_agent(),
            services: default_services(),
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.check_interval.is_zero() {
            return Err(GatewayError::Config(
                "health check_interval must be > 0".into(),
            ));
        }
        if self.check_timeout.is_zero() {
            return Err(GatewayError::Config(
                "health check_timeout must be > 0".into(),
            ));
        }
        for service in &self.services {
            if service.name.is_empty() || service.url.is_empty() {
                return Err(GatewayError::Config(format!(
                    "service entry needs both a name and a url: {:?}",
                    service
                )));
            }
        }
        Ok(())
    }
}

/// Top-level configuration consumed by `Gateway::new`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl GatewayConfig {
    /// Build a configuration from environment variables, falling back to defaults.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        let mut config = GatewayConfig::default();

        if let Some(v) = env_parse::<usize>("CACHE_MAX_SIZE_BYTES")? {
            config.cache.max_size = v;
        }
        if let Some(v) = env_parse::<usize>("CACHE_MAX_ENTRIES")? {
            config.cache.max_entries = v;
        }
        if let Some(v) = env_parse::<u64>("CACHE_DEFAULT_TTL_MS")? {
            config.cache.default_ttl = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("CACHE_CLEANUP_INTERVAL_MS")? {
            config.cache.cleanup_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("CIRCUIT_BREAKER_THRESHOLD")? {
            config.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("CIRCUIT_BREAKER_TIMEOUT_MS")? {
            config.circuit_breaker.timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("HEALTH_CHECK_INTERVAL_MS")? {
            config.discovery.check_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("HEALTH_CHECK_TIMEOUT_MS")? {
            config.discovery.check_timeout = Duration::from_millis(v);
        }

        config.discovery.services = DEFAULT_SERVICES
            .iter()
            .map(|(name, var, fallback)| ServiceConfig {
                name: name.to_string(),
                url: std::env::var(var).unwrap_or_else(|_| fallback.to_string()),
            })
            .collect();

        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file; missing sections take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: GatewayConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.circuit_breaker.validate()?;
        self.discovery.validate()
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| GatewayError::Config(format!("invalid value for {}: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

// Helper module to serialize/deserialize Duration with serde
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
