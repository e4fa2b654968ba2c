//! Capture configuration
//!
//! Every section has serde defaults, so a partial TOML document (or none at
//! all) yields a usable [`CaptureConfig`].

use distill_models::{PoolConfig, SessionOptions};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default system prompt for capture sessions.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You read web pages and describe them accurately. \
Only state facts present in the page. When asked for JSON, reply with JSON only.";

/// Complete configuration for a capture run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub language: LanguageConfig,

    #[serde(default)]
    pub condense: CondenseConfig,

    #[serde(default)]
    pub images: ImageConfig,
}

/// Options for sessions the pipeline opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub temperature: f32,
    pub top_k: u32,
    pub system_prompt: Option<String>,
}

impl Default for SessionSection {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            temperature: options.temperature,
            top_k: options.top_k,
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

impl SessionSection {
    /// Session options described by this section.
    pub fn options(&self) -> SessionOptions {
        let options = SessionOptions::new(self.temperature, self.top_k);
        match &self.system_prompt {
            Some(prompt) => options.system_prompt(prompt.clone()),
            None => options,
        }
    }
}

/// Language detection and translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Language pages are translated into.
    pub target_language: String,
    /// Detections below this confidence are ignored.
    pub min_confidence: f64,
    /// Characters of page text sampled for detection.
    pub sample_chars: usize,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            target_language: "en".to_string(),
            min_confidence: 0.3,
            sample_chars: 8000,
        }
    }
}

impl LanguageConfig {
    /// Whether `code` names the target language or one of its regional variants.
    pub fn is_target(&self, code: &str) -> bool {
        let code = code.trim();
        let target = self.target_language.as_str();
        if code.eq_ignore_ascii_case(target) {
            return true;
        }
        match (code.get(..target.len()), code.get(target.len()..)) {
            (Some(prefix), Some(rest)) => {
                prefix.eq_ignore_ascii_case(target) && rest.starts_with('-')
            }
            _ => false,
        }
    }
}

/// Budget for condensed page text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CondenseConfig {
    /// Upper bound on condensed text, in characters.
    pub max_chars: usize,
    /// Size of each chunk sent to the model when condensing.
    pub chunk_chars: usize,
}

impl Default for CondenseConfig {
    fn default() -> Self {
        Self {
            max_chars: 12_000,
            chunk_chars: 6_000,
        }
    }
}

/// Page image handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Hard cap on images attached per page.
    pub max_images: usize,
    /// Timeout for fetching a remote image.
    pub fetch_timeout_secs: u64,
    /// Largest remote image body read, in bytes.
    pub max_bytes: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_images: 5,
            fetch_timeout_secs: 10,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

impl CaptureConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: CaptureConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session
            .options()
            .validate()
            .map_err(|e| ConfigError::Invalid {
                field: "session",
                message: e.to_string(),
            })?;

        if self.pool.capacity == 0 {
            return Err(invalid("pool.capacity", "must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.pool.reuse_threshold_percent) {
            return Err(invalid(
                "pool.reuse_threshold_percent",
                "must be between 0 and 100",
            ));
        }
        if self.language.target_language.trim().is_empty() {
            return Err(invalid("language.target_language", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.language.min_confidence) {
            return Err(invalid(
                "language.min_confidence",
                "must be between 0 and 1",
            ));
        }
        if self.language.sample_chars == 0 {
            return Err(invalid("language.sample_chars", "must be at least 1"));
        }
        if self.condense.chunk_chars == 0 {
            return Err(invalid("condense.chunk_chars", "must be at least 1"));
        }
        if self.condense.max_chars < self.condense.chunk_chars {
            return Err(invalid(
                "condense.max_chars",
                "must be at least condense.chunk_chars",
            ));
        }
        if self.images.max_images == 0 {
            return Err(invalid("images.max_images", "must be at least 1"));
        }
        if self.images.max_bytes == 0 {
            return Err(invalid("images.max_bytes", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.to_string(),
    }
}
