// src/resilience/mod.rs
//! Per-service circuit breaking.
//!
//! Each backend gets its own circuit. The gateway asks `is_available` before
//! calling a backend and reports every outcome through `record_result`:
//!
//! 1. **Closed** - calls flow, consecutive failures are counted
//! 2. **Open** - calls fail fast until the timeout since the last failure elapses
//! 3. **Half-Open** - trial calls decide between closing and re-opening

mod circuit_breaker;

#[cfg(test)]
mod tests;

pub use circuit_breaker::{CircuitBreakerRegistry, CircuitMetrics, CircuitSnapshot, CircuitState};
