// src/cache/stats.rs

use serde::Serialize;
use std::time::Duration;

use crate::config::duration_serde;

/// Counters describing cache effectiveness and occupancy
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    /// Percentage of `get` calls that were hits, 0 when nothing was requested
    pub hit_rate: f64,
    /// Sum of the sizes of stored entries, in bytes
    pub total_size: usize,
    pub entry_count: usize,
    pub evictions: u64,
}

impl CacheStats {
    pub(crate) fn record_hit(&mut self) {
        self.total_requests += 1;
        self.hits += 1;
        self.update_hit_rate();
    }

    pub(crate) fn record_miss(&mut self) {
        self.total_requests += 1;
        self.misses += 1;
        self.update_hit_rate();
    }

    fn update_hit_rate(&mut self) {
        self.hit_rate = if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64 * 100.0
        };
    }
}

/// Stats plus configured limits and derived occupancy figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedCacheStats {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub max_size: usize,
    pub max_entries: usize,
    #[serde(rename = "default_ttl_ms", with = "duration_serde")]
    pub default_ttl: Duration,
    pub size_usage_percent: f64,
    pub entry_usage_percent: f64,
    pub average_entry_size: usize,
    /// Entries past their TTL still waiting for a lookup or the sweep
    pub expired_entries: usize,
    #[serde(rename = "oldest_entry_age_ms", with = "duration_serde")]
    pub oldest_entry_age: Duration,
}
