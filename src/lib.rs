// library entry
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod resilience;

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
mod tests;

// Re-export key components for convenience
pub use cache::{CacheManager, CacheStats};
pub use config::GatewayConfig;
pub use discovery::{ServiceDiscovery, ServiceStatus};
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayStatus};
pub use logging::init as init_logging;
pub use resilience::{CircuitBreakerRegistry, CircuitState};
