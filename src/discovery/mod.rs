// src/discovery/mod.rs
//! Service directory and health monitoring.
//!
//! # Data Flow
//! ```text
//! Interval timer (or check_all_services)
//!     → one task per service: GET <url>/health with its own timeout
//!     → join all, whatever the individual outcomes
//!     → write healthy/unhealthy back into the directory
//! ```
//!
//! Readers only ever see the result of the last completed sweep.

mod probe;
mod service_discovery;

#[cfg(test)]
mod tests;

pub use probe::{HealthProbe, HealthReport, HttpHealthProbe};
pub use service_discovery::{HealthCheckStats, ServiceDiscovery, ServiceRecord, ServiceStatus};
