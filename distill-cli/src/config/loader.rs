use super::types::{
    DistillConfig, OllamaSection, RawCondenseSection, RawDistillConfig, RawImageSection,
    RawLanguageSection, RawOllamaSection, RawPoolSection, RawSessionSection,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<DistillConfig> {
        let mut raw = RawDistillConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Self::finalize(raw)
    }

    /// Load a single config file, falling back to defaults if it doesn't exist
    pub fn load_from_path(path: &Path) -> Result<DistillConfig> {
        if !path.exists() {
            return Self::finalize(RawDistillConfig::default());
        }
        Self::finalize(Self::read_raw(path)?)
    }

    fn read_raw(path: &Path) -> Result<RawDistillConfig> {
        debug!(path = %path.display(), "Reading config");
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "distill").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with DISTILL_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("DISTILL_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".distill/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawDistillConfig, overlay: RawDistillConfig) -> RawDistillConfig {
        RawDistillConfig {
            ollama: RawOllamaSection {
                host: overlay.ollama.host.or(base.ollama.host),
                model: overlay.ollama.model.or(base.ollama.model),
                context_window: overlay.ollama.context_window.or(base.ollama.context_window),
            },
            session: RawSessionSection {
                temperature: overlay.session.temperature.or(base.session.temperature),
                top_k: overlay.session.top_k.or(base.session.top_k),
                system_prompt: overlay.session.system_prompt.or(base.session.system_prompt),
            },
            pool: RawPoolSection {
                capacity: overlay.pool.capacity.or(base.pool.capacity),
                reuse_threshold_percent: overlay
                    .pool
                    .reuse_threshold_percent
                    .or(base.pool.reuse_threshold_percent),
            },
            language: RawLanguageSection {
                target_language: overlay
                    .language
                    .target_language
                    .or(base.language.target_language),
                min_confidence: overlay
                    .language
                    .min_confidence
                    .or(base.language.min_confidence),
                sample_chars: overlay.language.sample_chars.or(base.language.sample_chars),
            },
            condense: RawCondenseSection {
                max_chars: overlay.condense.max_chars.or(base.condense.max_chars),
                chunk_chars: overlay.condense.chunk_chars.or(base.condense.chunk_chars),
            },
            images: RawImageSection {
                max_images: overlay.images.max_images.or(base.images.max_images),
                fetch_timeout_secs: overlay
                    .images
                    .fetch_timeout_secs
                    .or(base.images.fetch_timeout_secs),
                max_bytes: overlay.images.max_bytes.or(base.images.max_bytes),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawDistillConfig) -> Result<DistillConfig> {
        let defaults = OllamaSection::default();
        let capture = raw.capture_config();
        capture.validate()?;

        Ok(DistillConfig {
            ollama: OllamaSection {
                host: raw.ollama.host.unwrap_or(defaults.host),
                model: raw.ollama.model.unwrap_or(defaults.model),
                context_window: raw.ollama.context_window.unwrap_or(defaults.context_window),
            },
            capture,
        })
    }
}
