//! Core types shared by hosts, sessions and the pool.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Readiness of the model as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// The device cannot run the model.
    Unavailable,
    /// The model can be used once it has been downloaded.
    Downloadable,
    /// A download is in progress.
    Downloading,
    /// Sessions can be created right away.
    Available,
}

impl Availability {
    /// Whether polling should stop at this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Availability::Available | Availability::Unavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Unavailable => "unavailable",
            Availability::Downloadable => "downloadable",
            Availability::Downloading => "downloading",
            Availability::Available => "available",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling configuration for a new session.
///
/// # Examples
///
/// ```
/// use distill_models::SessionOptions;
///
/// let options = SessionOptions::new(0.2, 3).system_prompt("Be brief.");
/// assert!(options.validate().is_ok());
/// assert_eq!(options.system_prompt.as_deref(), Some("Be brief."));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Sampling temperature, 0.0 to 1.0.
    pub temperature: f32,
    /// Number of candidate tokens considered at each step.
    pub top_k: u32,
    /// Instructions kept across resets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl SessionOptions {
    /// Create options with the given sampling parameters and no system prompt.
    pub fn new(temperature: f32, top_k: u32) -> Self {
        Self {
            temperature,
            top_k,
            system_prompt: None,
        }
    }

    /// Set the system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Check that the sampling parameters are in range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::InvalidOptions(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidOptions(
                "top_k must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new(0.3, 3)
    }
}

/// Context budget consumed by a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextUsage {
    /// Tokens already held in the session context.
    pub used: u64,
    /// Maximum tokens the session may hold.
    pub quota: u64,
    /// `used / quota * 100`, or 0 when the quota is unknown.
    pub percent_used: f64,
}

impl ContextUsage {
    /// Compute usage from raw counters.
    pub fn new(used: u64, quota: u64) -> Self {
        let percent_used = if quota > 0 {
            used as f64 / quota as f64 * 100.0
        } else {
            0.0
        };
        Self {
            used,
            quota,
            percent_used,
        }
    }
}
