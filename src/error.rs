// for error definitions
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Invalid configuration (zero thresholds, empty limits, bad env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value could not be serialized or a payload could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Health probe failures (transport errors, non-2xx responses, timeouts)
    #[error("Probe error: {0}")]
    Probe(ProbeError),

    /// The circuit for this service is open, the call was not attempted
    #[error("Upstream unavailable: {0}")]
    ServiceUnavailable(String),

    /// No base URL is registered for this service
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// The proxied call itself failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Probe-specific errors
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Connection refused, DNS failure and other transport errors
    #[error("connection error: {0}")]
    Connection(String),

    /// Service answered with a non-2xx status
    #[error("unexpected status {0}")]
    Status(u16),

    /// No answer within the probe timeout
    #[error("timed out after {0} ms")]
    Timeout(u64),
}

// implement conversions from serde_json::Error to GatewayError
impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => GatewayError::Probe(ProbeError::Status(status.as_u16())),
            None => GatewayError::Probe(ProbeError::Connection(err.to_string())),
        }
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;
