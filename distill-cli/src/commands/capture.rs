//! Capture a page and optionally refine the result.
//!
//! Progress goes to stderr so the result JSON can be piped from stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use distill_core::{CaptureCallbacks, CapturePipeline, CaptureResult, PageContent};
use distill_models::{SessionManager, SessionPool};
use tracing::info;

use crate::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Extracted page content as JSON
    pub page: PathBuf,

    /// Refinement request applied after the capture (repeatable, applied in order)
    #[arg(long = "refine", value_name = "MESSAGE")]
    pub refinements: Vec<String>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Prints pipeline progress to stderr.
struct ProgressPrinter;

impl CaptureCallbacks for ProgressPrinter {
    fn on_condense_progress(&self, current: usize, total: usize) {
        eprintln!("Condensing {current}/{total}...");
    }

    fn on_summarize_progress(&self, current: usize, total: usize) {
        if current < total {
            eprintln!("Summarizing...");
        }
    }

    fn on_translation_start(&self, language: &str) {
        eprintln!("Translating from {language}...");
    }

    fn on_translation_error(&self, error: &str) {
        eprintln!("Translation failed, continuing with original text: {error}");
    }
}

pub async fn run(args: CaptureArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let page = read_page(&args.page)?;

    let manager = Arc::new(SessionManager::new(Arc::new(config.ollama.build_host())));
    let pool = Arc::new(SessionPool::new(manager, config.capture.pool.clone()));
    let pipeline = CapturePipeline::with_defaults(pool.clone(), config.capture)?;

    let outcome = capture(&pipeline, page, &args.refinements, &ProgressPrinter).await;
    pool.destroy_all().await;
    let result = outcome?;

    let json = serde_json::to_string_pretty(&result)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Read extracted page content from a JSON file.
fn read_page(path: &Path) -> Result<PageContent> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not page content JSON", path.display()))
}

/// Run the pipeline, then apply each refinement in order.
async fn capture(
    pipeline: &CapturePipeline,
    page: PageContent,
    refinements: &[String],
    callbacks: &dyn CaptureCallbacks,
) -> Result<CaptureResult> {
    let mut result = pipeline.execute(page, callbacks).await?;

    for message in refinements {
        info!(url = %result.processed_page_content.url, request = %message, "Refining capture");
        let chat = pipeline.refine(&result.summary_response(), message).await?;
        eprintln!("> {message}\n{}", chat.reply);
        result.apply(chat.response);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use distill_core::multimodal::{HttpImageFetcher, ImageContextBuilder};
    use distill_core::{CaptureConfig, LanguageCandidate, LanguageDetector, NoopCallbacks, Translator};
    use distill_models::PoolConfig;
    use distill_models::mock::{MockHost, MockReply};
    use std::time::Duration;
    use tempfile::TempDir;

    struct English;

    #[async_trait]
    impl LanguageDetector for English {
        async fn detect(&self, _text: &str) -> distill_models::Result<Vec<LanguageCandidate>> {
            Ok(vec![LanguageCandidate::new("en", 1.0)])
        }
    }

    struct Echo;

    #[async_trait]
    impl Translator for Echo {
        async fn translate(
            &self,
            text: &str,
            _source: &str,
            _target: &str,
        ) -> distill_models::Result<String> {
            Ok(text.to_string())
        }
    }

    fn pipeline(host: &MockHost) -> CapturePipeline {
        let manager = Arc::new(SessionManager::new(Arc::new(host.clone())));
        let pool = Arc::new(SessionPool::new(manager, PoolConfig::default()));
        let fetcher = HttpImageFetcher::new(Duration::from_secs(1), 1024 * 1024).unwrap();
        CapturePipeline::new(
            pool,
            Arc::new(English),
            Arc::new(Echo),
            ImageContextBuilder::new(Arc::new(fetcher), 5),
            CaptureConfig::default(),
        )
    }

    // ==================== read_page Tests ====================

    #[test]
    fn test_read_page_parses_extractor_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("page.json");
        std::fs::write(
            &path,
            r#"{
                "title": "Pancakes",
                "url": "https://example.com/pancakes",
                "fullText": "Mix and fry.",
                "metadata": {"contentType": "recipe"},
                "images": [{"url": "https://example.com/p.png", "alt": "stack"}]
            }"#,
        )
        .unwrap();

        let page = read_page(&path).unwrap();

        assert_eq!(page.title, "Pancakes");
        assert_eq!(page.full_text, "Mix and fry.");
        assert_eq!(page.images[0].src, "https://example.com/p.png");
    }

    #[test]
    fn test_read_page_rejects_non_page_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("page.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = read_page(&path).unwrap_err();
        assert!(err.to_string().contains("is not page content JSON"));
    }

    // ==================== capture Tests ====================

    #[tokio::test]
    async fn test_capture_applies_refinements_in_order() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(r#"{"contentType": "recipe"}"#));
        host.queue_reply(MockReply::text(
            r#"{"summary": "Long pancake summary.", "structuredData": {"servings": 4}}"#,
        ));
        host.queue_reply(MockReply::text(
            r#"{"reply": "Shortened.", "summary": "Pancakes.", "structuredData": {"servings": 4}}"#,
        ));
        host.queue_reply(MockReply::text(
            r#"{"reply": "Added time.", "summary": "Pancakes.", "structuredData": {"servings": 4, "time": "10 min"}}"#,
        ));
        let pipeline = pipeline(&host);
        let page = PageContent::new("Pancakes", "https://example.com/pancakes", "Mix and fry.");
        let refinements = vec!["shorter".to_string(), "add the time".to_string()];

        let result = capture(&pipeline, page, &refinements, &NoopCallbacks)
            .await
            .unwrap();

        assert_eq!(result.summary, "Pancakes.");
        assert_eq!(result.structured_data["time"], "10 min");
        let prompts = host.prompts();
        assert!(prompts[2].text.contains("shorter"));
        assert!(prompts[3].text.contains("add the time"));
    }

    #[tokio::test]
    async fn test_capture_without_refinements_keeps_summary() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(r#"{"contentType": "article"}"#));
        host.queue_reply(MockReply::text("Plain text summary."));
        let pipeline = pipeline(&host);
        let page = PageContent::new("News", "https://example.com/news", "Something happened.");

        let result = capture(&pipeline, page, &[], &NoopCallbacks).await.unwrap();

        assert_eq!(result.summary, "Plain text summary.");
        assert!(result.structured_data.is_empty());
    }
}
