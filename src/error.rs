//! Error types for the WoT gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring, binding or running the gateway
///
/// Request-level failures are reported through [`crate::api::ApiError`]
/// instead; nothing here crosses a request boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Route table could not be built from a thing description
    #[error("binding error: {0}")]
    Binding(String),

    /// HTTP server failed to bind or run
    #[error("server error: {0}")]
    Server(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
