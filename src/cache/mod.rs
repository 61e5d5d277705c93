// src/cache/mod.rs
//! Bounded response cache.
//!
//! Entries expire after their TTL and are removed lazily on lookup or by the
//! periodic sweep. When a write would exceed the byte or entry budget, expired
//! entries are evicted first, then least recently used ones.

mod entry;
mod manager;
mod stats;

#[cfg(test)]
mod tests;

pub use entry::{CachedEntry, EntryInfo};
pub use manager::{json_size, CacheManager, SizeFn};
pub use stats::{CacheStats, DetailedCacheStats};
