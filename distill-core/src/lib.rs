//! distill-core: capture pipeline for distill
//!
//! This crate turns extracted page content into a summary and structured data:
//!
//! - **Page model** - [`PageContent`] in, [`CaptureResult`] out
//! - **Pipeline** - [`CapturePipeline`] drives a model session through the
//!   capture stages and applies chat refinements afterwards
//! - **Normalization** - [`normalize::normalize`] flattens model output into
//!   presentable key/value data
//! - **Images** - [`multimodal::ImageContextBuilder`] validates page images and
//!   attaches them to a session
//! - **Configuration** - [`CaptureConfig`] with serde defaults for every section
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use distill_core::{CaptureConfig, CapturePipeline, NoopCallbacks, PageContent};
//! use distill_models::providers::OllamaHost;
//! use distill_models::{SessionManager, SessionPool};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CaptureConfig::default();
//!     let manager = Arc::new(SessionManager::new(Arc::new(OllamaHost::new())));
//!     let pool = Arc::new(SessionPool::new(manager, config.pool.clone()));
//!     let pipeline = CapturePipeline::with_defaults(pool, config)?;
//!
//!     let page = PageContent::new("Title", "https://example.com", "Page text");
//!     let result = pipeline.execute(page, &NoopCallbacks).await?;
//!     println!("{}", result.summary);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  CapturePipeline                      │
//! │  Start → LanguageNormalize → Classify → Condense      │
//! │        → ResetForSummarize → AttachImageContext       │
//! │        → Summarize → Done                             │
//! └──────────────────────────────────────────────────────┘
//!        │ detector / translator       │ checkout / release
//!        ▼                             ▼
//! ┌──────────────────┐       ┌──────────────────────────┐
//! │ short-lived      │       │ distill_models::         │
//! │ model sessions   │       │ SessionPool              │
//! └──────────────────┘       └──────────────────────────┘
//! ```

pub mod config;
mod error;
pub mod multimodal;
pub mod normalize;
pub mod page;
pub mod pipeline;

// Re-export key types for convenience
pub use config::{CaptureConfig, CondenseConfig, ImageConfig, LanguageConfig, SessionSection};
pub use error::{ConfigError, ImageError, PipelineError};
pub use multimodal::ImageContextBuilder;
pub use page::{
    CaptureResult, ChatResponse, CondensedPageContent, ContentType, PageContent, PageImage,
    PageLink, PageMetadata, StructuredData, SummaryResponse,
};
pub use pipeline::{
    CaptureCallbacks, CapturePipeline, CaptureStage, CaptureState, LanguageCandidate,
    LanguageDetector, NoopCallbacks, Translator,
};
