use distill_core::{
    CaptureConfig, CondenseConfig, ImageConfig, LanguageConfig, SessionSection,
};
use distill_models::PoolConfig;
use distill_models::providers::OllamaHost;
pub use distill_models::providers::ollama::{
    DEFAULT_BASE_URL as DEFAULT_OLLAMA_HOST, DEFAULT_CONTEXT_WINDOW, DEFAULT_MODEL,
};
use serde::{Deserialize, Serialize};

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDistillConfig {
    #[serde(default)]
    pub ollama: RawOllamaSection,

    #[serde(default)]
    pub session: RawSessionSection,

    #[serde(default)]
    pub pool: RawPoolSection,

    #[serde(default)]
    pub language: RawLanguageSection,

    #[serde(default)]
    pub condense: RawCondenseSection,

    #[serde(default)]
    pub images: RawImageSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawOllamaSection {
    /// Base URL of the Ollama server
    pub host: Option<String>,

    /// Model every session talks to
    pub model: Option<String>,

    /// Context window requested per session, in tokens
    pub context_window: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSessionSection {
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPoolSection {
    pub capacity: Option<usize>,
    pub reuse_threshold_percent: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawLanguageSection {
    pub target_language: Option<String>,
    pub min_confidence: Option<f64>,
    pub sample_chars: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCondenseSection {
    pub max_chars: Option<usize>,
    pub chunk_chars: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawImageSection {
    pub max_images: Option<usize>,
    pub fetch_timeout_secs: Option<u64>,
    pub max_bytes: Option<u64>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DistillConfig {
    #[serde(default)]
    pub ollama: OllamaSection,

    #[serde(flatten)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaSection {
    pub host: String,
    pub model: String,
    pub context_window: u32,
}

impl Default for OllamaSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl OllamaSection {
    /// Host described by this section.
    pub fn build_host(&self) -> OllamaHost {
        OllamaHost::with_base_url(&self.host)
            .model(&self.model)
            .context_window(self.context_window)
    }
}

impl RawDistillConfig {
    /// Capture settings with defaults filled in for every unset field
    pub fn capture_config(&self) -> CaptureConfig {
        let session = SessionSection::default();
        let pool = PoolConfig::default();
        let language = LanguageConfig::default();
        let condense = CondenseConfig::default();
        let images = ImageConfig::default();

        CaptureConfig {
            session: SessionSection {
                temperature: self.session.temperature.unwrap_or(session.temperature),
                top_k: self.session.top_k.unwrap_or(session.top_k),
                system_prompt: self.session.system_prompt.clone().or(session.system_prompt),
            },
            pool: PoolConfig {
                capacity: self.pool.capacity.unwrap_or(pool.capacity),
                reuse_threshold_percent: self
                    .pool
                    .reuse_threshold_percent
                    .unwrap_or(pool.reuse_threshold_percent),
            },
            language: LanguageConfig {
                target_language: self
                    .language
                    .target_language
                    .clone()
                    .unwrap_or(language.target_language),
                min_confidence: self
                    .language
                    .min_confidence
                    .unwrap_or(language.min_confidence),
                sample_chars: self.language.sample_chars.unwrap_or(language.sample_chars),
            },
            condense: CondenseConfig {
                max_chars: self.condense.max_chars.unwrap_or(condense.max_chars),
                chunk_chars: self.condense.chunk_chars.unwrap_or(condense.chunk_chars),
            },
            images: ImageConfig {
                max_images: self.images.max_images.unwrap_or(images.max_images),
                fetch_timeout_secs: self
                    .images
                    .fetch_timeout_secs
                    .unwrap_or(images.fetch_timeout_secs),
                max_bytes: self.images.max_bytes.unwrap_or(images.max_bytes),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = DistillConfig::default();
        assert_eq!(config.ollama.host, DEFAULT_OLLAMA_HOST);
        assert_eq!(config.ollama.model, DEFAULT_MODEL);
        assert_eq!(config.ollama.context_window, DEFAULT_CONTEXT_WINDOW);
        assert_eq!(config.capture, CaptureConfig::default());
    }

    #[test]
    fn test_default_section_builds_default_host() {
        let configured = OllamaSection::default().build_host();
        let bare = OllamaHost::new();
        assert_eq!(configured.base_url(), bare.base_url());
        assert_eq!(configured.model_name(), bare.model_name());
        assert_eq!(bare.model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = DistillConfig {
            ollama: OllamaSection {
                host: "http://10.0.0.5:11434".to_string(),
                model: "qwen2.5:7b".to_string(),
                context_window: 16_384,
            },
            ..Default::default()
        };
        config.capture.images.max_images = 3;
        config.capture.language.target_language = "de".to_string();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: DistillConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed, config);
        assert!(toml_str.contains("[ollama]"));
        assert!(toml_str.contains("[images]"));
    }

    #[test]
    fn test_raw_config_partial_parsing() {
        let toml_str = r#"
[ollama]
model = "mistral"

[images]
max_images = 2
"#;
        let raw: RawDistillConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(raw.ollama.model.as_deref(), Some("mistral"));
        assert!(raw.ollama.host.is_none());
        assert_eq!(raw.images.max_images, Some(2));
        assert!(raw.images.fetch_timeout_secs.is_none());
    }

    #[test]
    fn test_raw_config_empty_uses_none() {
        let raw: RawDistillConfig = toml::from_str("").unwrap();

        assert!(raw.ollama.host.is_none());
        assert!(raw.session.temperature.is_none());
        assert!(raw.language.target_language.is_none());
        assert_eq!(raw.capture_config(), CaptureConfig::default());
    }

    #[test]
    fn test_capture_config_fills_unset_fields() {
        let raw: RawDistillConfig = toml::from_str(
            r#"
[language]
min_confidence = 0.5

[condense]
chunk_chars = 4000
"#,
        )
        .unwrap();

        let capture = raw.capture_config();

        assert_eq!(capture.language.min_confidence, 0.5);
        assert_eq!(capture.language.target_language, "en");
        assert_eq!(capture.condense.chunk_chars, 4000);
        assert_eq!(capture.condense.max_chars, CondenseConfig::default().max_chars);
    }

    #[test]
    fn test_build_host_uses_section() {
        let section = OllamaSection {
            host: "http://gpu-box:11434/".to_string(),
            model: "gemma2".to_string(),
            context_window: 4096,
        };

        let host = section.build_host();

        assert_eq!(host.base_url(), "http://gpu-box:11434");
        assert_eq!(host.model_name(), "gemma2");
    }
}
