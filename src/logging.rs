use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,gateway_core=trace
pub fn init() {
    INIT.call_once(|| {
        // Default to 'info' level if RUST_LOG is not set
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true) // health probes run on several workers
                    .with_line_number(true),
            )
            .init();

        tracing::info!("Logging initialized");
    });
}

/// Initialize logging with JSON output, for log shippers.
pub fn init_json() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .init();

        tracing::info!("JSON logging initialized");
    });
}

/// Macro for logging circuit breaker transitions
#[macro_export]
macro_rules! breaker_event {
    ($service:expr, $from:expr, $to:expr, $failures:expr) => {
        tracing::info!(
            service = %$service,
            from = ?$from,
            to = ?$to,
            failure_count = $failures,
            "Circuit state transition"
        )
    };
}

/// Macro for logging cache operations with sizes
#[macro_export]
macro_rules! cache_event {
    ($operation:expr, $key:expr, $size:expr) => {
        tracing::debug!(
            operation = $operation,
            key = %$key,
            size_bytes = $size,
            "Cache operation"
        )
    };
}
