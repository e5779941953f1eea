//! Error types for the depth latency meter

use thiserror::Error;

/// Depth stream and latency meter errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Failed to resolve {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("No IPs resolved for {0}")]
    NoAddresses(String),

    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Invalid {field} in level: {value:?}")]
    InvalidLevel { field: &'static str, value: String },

    #[error("Previous ping was not ponged")]
    PingTimeout,

    #[error("could not update depth: {0}")]
    Rejected(String),

    #[error("Data listener is no longer available")]
    ListenerGone,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Connection was already started")]
    AlreadyStarted,

    #[error("Connection is stopped")]
    Stopped,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<native_tls::Error> for MarketDataError {
    fn from(err: native_tls::Error) -> Self {
        MarketDataError::Tls(err.to_string())
    }
}

impl From<prometheus::Error> for MarketDataError {
    fn from(err: prometheus::Error) -> Self {
        MarketDataError::MetricsError(err.to_string())
    }
}

impl From<std::io::Error> for MarketDataError {
    fn from(err: std::io::Error) -> Self {
        MarketDataError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
