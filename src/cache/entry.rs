// src/cache/entry.rs

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::duration_serde;

/// Entry in the in-memory cache
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) inserted_at: Instant,
    pub(crate) ttl: Duration,
    pub(crate) access_count: u64,
    pub(crate) last_accessed: Instant,
    /// Logical clock value of the last write or hit, orders LRU eviction
    pub(crate) access_tick: u64,
    pub(crate) size: usize,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, ttl: Duration, size: usize, now: Instant, tick: u64) -> Self {
        Self {
            value,
            inserted_at: now,
            ttl,
            access_count: 0,
            last_accessed: now,
            access_tick: tick,
            size,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }

    pub(crate) fn info(&self, key: &str, now: Instant) -> EntryInfo {
        let age = now.saturating_duration_since(self.inserted_at);
        EntryInfo {
            key: key.to_string(),
            size: self.size,
            ttl: self.ttl,
            age,
            remaining_ttl: self.ttl.saturating_sub(age),
            access_count: self.access_count,
            idle: now.saturating_duration_since(self.last_accessed),
            expired: self.is_expired(now),
        }
    }
}

/// Read-only view of one cache entry's metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub key: String,
    /// Serialized size in bytes, measured at insertion
    pub size: usize,
    #[serde(rename = "ttl_ms", with = "duration_serde")]
    pub ttl: Duration,
    #[serde(rename = "age_ms", with = "duration_serde")]
    pub age: Duration,
    #[serde(rename = "remaining_ttl_ms", with = "duration_serde")]
    pub remaining_ttl: Duration,
    pub access_count: u64,
    /// Time since the entry was last written or read
    #[serde(rename = "idle_ms", with = "duration_serde")]
    pub idle: Duration,
    /// Expired but not yet removed by a lookup or sweep
    pub expired: bool,
}

/// A copied value together with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct CachedEntry<V> {
    #[serde(flatten)]
    pub info: EntryInfo,
    pub value: V,
}
