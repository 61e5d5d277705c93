// src/discovery/tests/mod.rs
//! Tests for service discovery and health sweeps


pub(crate) mod utils {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{DiscoveryConfig, ServiceConfig};
    use crate::discovery::ServiceDiscovery;
    use crate::test_utils::MockProbe;

    pub fn test_config(services: &[(&str, &str)], timeout: Duration) -> DiscoveryConfig {
        DiscoveryConfig {
            check_interval: Duration::from_secs(30),
            check_timeout: timeout,
            services: services
                .iter()
                .map(|(name, url)| ServiceConfig {
                    name: name.to_string(),
                    url: url.to_string(),
                })
                .collect(),
            ..DiscoveryConfig::default()
        }
    }

    pub fn create_discovery(
        services: &[(&str, &str)],
        timeout: Duration,
    ) -> (ServiceDiscovery, Arc<MockProbe>) {
        let probe = Arc::new(MockProbe::new());
        let discovery = ServiceDiscovery::with_probe(test_config(services, timeout), probe.clone())
            .expect("valid discovery config");
        (discovery, probe)
    }
}
