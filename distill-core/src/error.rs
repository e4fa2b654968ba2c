//! Error types for distill-core

use thiserror::Error;

/// Top-level error type for a capture run.
///
/// Only failures with no usable result surface here; every other stage
/// falls back locally.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to acquire a model session: {0}")]
    SessionAcquisition(#[source] distill_models::Error),

    #[error("Failed to reset session context: {0}")]
    Reset(#[source] distill_models::Error),

    #[error("Summarization failed: {0}")]
    Summarize(#[source] distill_models::Error),

    #[error("Refinement failed: {0}")]
    Refine(#[source] distill_models::Error),
}

impl PipelineError {
    /// The underlying model error.
    pub fn model_error(&self) -> &distill_models::Error {
        match self {
            PipelineError::SessionAcquisition(e)
            | PipelineError::Reset(e)
            | PipelineError::Summarize(e)
            | PipelineError::Refine(e) => e,
        }
    }
}

/// Errors related to page images
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to fetch image: {0}")]
    NetworkFetch(String),

    #[error("Invalid image: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for ImageError {
    fn from(e: reqwest::Error) -> Self {
        ImageError::NetworkFetch(e.to_string())
    }
}

/// Errors from loading or validating capture configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}
