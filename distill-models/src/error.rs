//! Error types for model sessions.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a model host.
#[derive(Debug, Error)]
pub enum Error {
    /// No model runtime has been registered with the session manager.
    #[error("no model runtime is registered")]
    ServiceUnavailable,

    /// The runtime exists but reports the model as unusable on this device.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The model answered, but not in the shape that was asked for.
    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),

    /// Session options are out of range.
    #[error("invalid session options: {0}")]
    InvalidOptions(String),

    /// A streaming consumer rejected a chunk.
    #[error("stream consumer failed: {0}")]
    Callback(String),

    /// Provider API error.
    #[error("provider API error: {0}")]
    ProviderApi(String),

    /// Request failed.
    #[error("request failed: {0}")]
    Request(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
