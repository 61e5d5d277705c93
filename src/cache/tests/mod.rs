// src/cache/tests/mod.rs
//! Tests for the response cache


// Common test utilities for cache testing
pub(crate) mod utils {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::SizeFn;
    use crate::config::CacheConfig;

    /// Config without the background sweep, so tests control expiry themselves
    pub fn test_config(max_entries: usize, max_size: usize) -> CacheConfig {
        CacheConfig {
            max_size,
            max_entries,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            use_background_task: false,
        }
    }

    /// Sizes strings by their byte length, independent of JSON quoting
    pub fn len_sizer() -> SizeFn<String> {
        Arc::new(|value: &String| Ok(value.len()))
    }
}
