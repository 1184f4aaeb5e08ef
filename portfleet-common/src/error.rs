//! Error types for `PortFleet`

use thiserror::Error;

/// Main error type for `PortFleet` operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Port or port range token could not be parsed
    #[error("Invalid port range: {0}")]
    InvalidPortRange(String),

    /// Route registration rejected
    #[error("Route error: {0}")]
    Route(String),

    /// Listener failed to bind or serve
    #[error("Listener on port {port} failed: {reason}")]
    Listener { port: u16, reason: String },

    /// Tunnel provider error
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ServerError>;
