//! Capture pipeline
//!
//! A run walks a fixed sequence of stages:
//!
//! ```text
//! Start → LanguageNormalize → Classify → Condense → ResetForSummarize
//!       → AttachImageContext → Summarize → Done
//! ```
//!
//! Each stage takes the page by value and hands a new value to the next one.
//! Every stage except Summarize falls back locally when the model misbehaves,
//! so a run fails only when no session can be had or the summary call itself
//! is rejected.

mod callbacks;
pub mod chat;
mod classify;
mod condense;
mod language;
mod state;
mod summarize;
mod text;

use std::sync::Arc;

use chrono::Utc;
use distill_models::session::reset_context;
use distill_models::{SessionHandle, SessionPool};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::{ImageError, PipelineError};
use crate::multimodal::ImageContextBuilder;
use crate::page::{CaptureResult, ChatResponse, PageContent, SummaryResponse};

pub use callbacks::{CaptureCallbacks, NoopCallbacks};
pub use classify::classify;
pub use condense::condense;
pub use language::{
    LanguageCandidate, LanguageDetector, ModelLanguageDetector, ModelTranslator, Translator,
    normalize_language,
};
pub use state::{CaptureStage, CaptureState};
pub use summarize::{parse_summary, summarize};
pub use text::{clip, split_chunks, truncate_chars};

/// Runs captures against a shared session pool.
pub struct CapturePipeline {
    pool: Arc<SessionPool>,
    detector: Arc<dyn LanguageDetector>,
    translator: Arc<dyn Translator>,
    images: ImageContextBuilder,
    config: CaptureConfig,
}

impl CapturePipeline {
    pub fn new(
        pool: Arc<SessionPool>,
        detector: Arc<dyn LanguageDetector>,
        translator: Arc<dyn Translator>,
        images: ImageContextBuilder,
        config: CaptureConfig,
    ) -> Self {
        Self {
            pool,
            detector,
            translator,
            images,
            config,
        }
    }

    /// Pipeline whose detector, translator and image fetcher are the default
    /// model- and HTTP-backed ones.
    pub fn with_defaults(pool: Arc<SessionPool>, config: CaptureConfig) -> Result<Self, ImageError> {
        let manager = pool.manager().clone();
        let images = ImageContextBuilder::from_config(&config.images)?;
        Ok(Self::new(
            pool,
            Arc::new(ModelLanguageDetector::new(manager.clone())),
            Arc::new(ModelTranslator::new(manager)),
            images,
            config,
        ))
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Run every stage for `page`.
    pub async fn execute(
        &self,
        page: PageContent,
        callbacks: &dyn CaptureCallbacks,
    ) -> Result<CaptureResult, PipelineError> {
        let mut state = CaptureState::start(page);
        loop {
            state = match state {
                CaptureState::Done(result) => return Ok(*result),
                other => self.step(other, callbacks).await?,
            };
        }
    }

    /// Advance `state` by one stage. `Done` stays `Done`.
    ///
    /// On error the run's session has already been destroyed.
    pub async fn step(
        &self,
        state: CaptureState,
        callbacks: &dyn CaptureCallbacks,
    ) -> Result<CaptureState, PipelineError> {
        debug!(stage = %state.stage(), url = %state.page().url, "Capture stage");

        match state {
            CaptureState::Start { page } => {
                info!(url = %page.url, extractor = %page.extractor, "Starting capture");
                let session = self
                    .pool
                    .checkout(&self.config.session.options())
                    .await
                    .map_err(PipelineError::SessionAcquisition)?;
                Ok(CaptureState::LanguageNormalize { page, session })
            }

            CaptureState::LanguageNormalize { page, session } => {
                let page = normalize_language(
                    page,
                    self.detector.as_ref(),
                    self.translator.as_ref(),
                    &self.config.language,
                    callbacks,
                )
                .await;
                Ok(CaptureState::Classify { page, session })
            }

            CaptureState::Classify { page, mut session } => {
                let page = classify(page, session.as_mut()).await;
                Ok(CaptureState::Condense { page, session })
            }

            CaptureState::Condense { page, mut session } => {
                let condensed = condense(
                    &page,
                    &mut session,
                    &self.config.condense,
                    self.config.pool.reuse_threshold_percent,
                    |current, total| callbacks.on_condense_progress(current, total),
                )
                .await;
                Ok(CaptureState::ResetForSummarize {
                    page,
                    condensed,
                    session,
                })
            }

            CaptureState::ResetForSummarize {
                page,
                condensed,
                session,
            } => {
                let session = self.reset_for_summarize(session).await?;
                Ok(CaptureState::AttachImageContext {
                    page,
                    condensed,
                    session,
                })
            }

            CaptureState::AttachImageContext {
                page,
                condensed,
                mut session,
            } => {
                let image_count = self.images.attach(session.as_mut(), &page).await;
                Ok(CaptureState::Summarize {
                    page,
                    condensed,
                    session,
                    image_count,
                })
            }

            CaptureState::Summarize {
                page,
                condensed,
                mut session,
                image_count,
            } => {
                let response = summarize(session.as_mut(), &condensed, image_count, |current, total| {
                    callbacks.on_summarize_progress(current, total)
                })
                .await;

                match response {
                    Ok(SummaryResponse {
                        summary,
                        structured_data,
                    }) => {
                        self.pool.release(session).await;
                        info!(url = %page.url, content_type = %page.content_type(), "Capture complete");
                        Ok(CaptureState::Done(Box::new(CaptureResult {
                            processed_page_content: page,
                            condensed_content: condensed,
                            summary,
                            structured_data,
                            captured_at: Utc::now(),
                        })))
                    }
                    Err(e) => {
                        warn!(url = %page.url, error = %e, "Summarization rejected, abandoning session");
                        session.destroy().await;
                        Err(PipelineError::Summarize(e))
                    }
                }
            }

            done @ CaptureState::Done(_) => Ok(done),
        }
    }

    /// Give summarization a clean context.
    ///
    /// Falls back to a fresh session when cloning fails.
    async fn reset_for_summarize(
        &self,
        mut session: SessionHandle,
    ) -> Result<SessionHandle, PipelineError> {
        match reset_context(&mut session).await {
            Ok(()) => Ok(session),
            Err(e) => {
                warn!(session = session.id(), error = %e, "Context reset failed, opening a fresh session");
                session.destroy().await;
                self.pool
                    .manager()
                    .create_session(&self.config.session.options())
                    .await
                    .map_err(PipelineError::Reset)
            }
        }
    }

    /// Apply a chat request to a finished capture's summary.
    pub async fn refine(
        &self,
        current: &SummaryResponse,
        message: &str,
    ) -> Result<ChatResponse, PipelineError> {
        let mut session = self
            .pool
            .checkout(&self.config.session.options())
            .await
            .map_err(PipelineError::SessionAcquisition)?;

        match chat::refine(session.as_mut(), current, message).await {
            Ok(response) => {
                self.pool.release(session).await;
                Ok(response)
            }
            Err(e) => {
                session.destroy().await;
                Err(PipelineError::Refine(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multimodal::{FetchedImage, ImageFetcher};
    use crate::page::{ContentType, PageImage};
    use async_trait::async_trait;
    use distill_models::mock::{MockHost, MockPrompt, MockReply};
    use distill_models::{Availability, Error, PoolConfig, SessionManager};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    // ==================== Test Doubles ====================

    struct FixedDetector(Vec<LanguageCandidate>);

    #[async_trait]
    impl LanguageDetector for FixedDetector {
        async fn detect(&self, _text: &str) -> distill_models::Result<Vec<LanguageCandidate>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct UpperTranslator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for UpperTranslator {
        async fn translate(
            &self,
            text: &str,
            _source: &str,
            _target: &str,
        ) -> distill_models::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_uppercase())
        }
    }

    struct PngFetcher;

    #[async_trait]
    impl ImageFetcher for PngFetcher {
        async fn fetch(&self, _url: &Url) -> Result<FetchedImage, ImageError> {
            Ok(FetchedImage {
                status: 200,
                content_type: Some("image/png".to_string()),
                bytes: vec![0x89, b'P', b'N', b'G'],
            })
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl CaptureCallbacks for Recorder {
        fn on_condense_progress(&self, current: usize, total: usize) {
            self.0.lock().unwrap().push(format!("condense {current}/{total}"));
        }
        fn on_summarize_progress(&self, current: usize, total: usize) {
            self.0.lock().unwrap().push(format!("summarize {current}/{total}"));
        }
        fn on_translation_start(&self, language: &str) {
            self.0.lock().unwrap().push(format!("translate {language}"));
        }
        fn on_translation_complete(&self) {
            self.0.lock().unwrap().push("translated".to_string());
        }
    }

    const SUMMARY_JSON: &str = r#"{"summary": "A page about Rust.", "structuredData": {"topics": ["ownership", ["borrowing"]], "author": {"name": "Ferris"}}}"#;

    /// Routes prompts by their opening words.
    fn scripted(prompt: &MockPrompt) -> MockReply {
        if prompt.text.starts_with("Classify") {
            MockReply::text(r#"{"contentType": "article"}"#)
        } else if prompt.text.starts_with("Condense") {
            MockReply::text("Condensed chunk.")
        } else if prompt.text.starts_with("Summarize") {
            MockReply::Chunks(vec![SUMMARY_JSON[..20].to_string(), SUMMARY_JSON[20..].to_string()])
        } else {
            MockReply::text("")
        }
    }

    struct Harness {
        host: MockHost,
        pipeline: CapturePipeline,
        translator: Arc<UpperTranslator>,
    }

    fn harness(detected: Vec<LanguageCandidate>) -> Harness {
        let host = MockHost::new();
        host.respond_with(scripted);
        let manager = Arc::new(SessionManager::new(Arc::new(host.clone())));
        let pool = Arc::new(SessionPool::new(manager, PoolConfig::default()));
        let translator = Arc::new(UpperTranslator::default());
        let pipeline = CapturePipeline::new(
            pool,
            Arc::new(FixedDetector(detected)),
            translator.clone(),
            ImageContextBuilder::new(Arc::new(PngFetcher), 5),
            CaptureConfig::default(),
        );
        Harness {
            host,
            pipeline,
            translator,
        }
    }

    fn english() -> Vec<LanguageCandidate> {
        vec![LanguageCandidate::new("en", 0.98)]
    }

    fn page() -> PageContent {
        PageContent::new(
            "Understanding Ownership",
            "https://doc.rust-lang.org/book/ch04-00.html",
            "Ownership is Rust's most unique feature.",
        )
    }

    fn prompts_starting_with(host: &MockHost, prefix: &str) -> usize {
        host.prompts()
            .iter()
            .filter(|p| p.text.starts_with(prefix))
            .count()
    }

    // ==================== execute Tests ====================

    #[tokio::test]
    async fn full_run_produces_normalized_result() {
        let h = harness(english());
        let recorder = Recorder::default();

        let result = h.pipeline.execute(page(), &recorder).await.unwrap();

        assert_eq!(result.summary, "A page about Rust.");
        assert_eq!(
            serde_json::Value::Object(result.structured_data.clone()),
            serde_json::json!({"topics": ["ownership", "borrowing"], "author": "name: Ferris"})
        );
        assert_eq!(result.processed_page_content.content_type(), ContentType::Article);
        assert_eq!(result.condensed_content.text, "Ownership is Rust's most unique feature.");
        assert_eq!(result.condensed_content.chunks, 0);
        assert_eq!(recorder.events(), vec!["summarize 0/1", "summarize 1/1"]);
    }

    #[tokio::test]
    async fn session_is_reset_once_and_returned_to_pool() {
        let h = harness(english());

        h.pipeline.execute(page(), &NoopCallbacks).await.unwrap();

        // checkout + one clone for the summarize reset
        assert_eq!(h.host.created_count(), 2);
        assert_eq!(h.host.destroyed_count(), 1);
        assert_eq!(h.pipeline.pool().idle_count().await, 1);

        let prompts = h.host.prompts();
        let classify = prompts.iter().find(|p| p.text.starts_with("Classify")).unwrap();
        let summarize = prompts.iter().find(|p| p.text.starts_with("Summarize")).unwrap();
        assert_ne!(classify.session_id, summarize.session_id);
    }

    #[tokio::test]
    async fn specialized_content_type_is_never_classified() {
        let h = harness(english());
        let mut arxiv = page();
        arxiv.metadata.content_type = ContentType::Arxiv;

        let result = h.pipeline.execute(arxiv, &NoopCallbacks).await.unwrap();

        assert_eq!(result.processed_page_content.content_type(), ContentType::Arxiv);
        assert_eq!(prompts_starting_with(&h.host, "Classify"), 0);
    }

    #[tokio::test]
    async fn foreign_page_is_translated_before_summarizing() {
        let h = harness(vec![LanguageCandidate::new("fr", 0.9)]);
        let recorder = Recorder::default();
        let mut french = page();
        french.full_text = "la propriété".to_string();

        let result = h.pipeline.execute(french, &recorder).await.unwrap();

        let processed = &result.processed_page_content;
        assert_eq!(processed.full_text, "LA PROPRIÉTÉ");
        assert_eq!(processed.metadata.extra["originalLanguage"], "fr");
        assert_eq!(processed.metadata.extra["languageDetectionConfidence"], 0.9);
        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            recorder.events()[..2],
            ["translate fr".to_string(), "translated".to_string()]
        );
        let summarize = h
            .host
            .prompts()
            .into_iter()
            .find(|p| p.text.starts_with("Summarize"))
            .unwrap();
        assert!(summarize.text.contains("LA PROPRIÉTÉ"));
    }

    #[tokio::test]
    async fn low_confidence_detection_skips_translation() {
        let h = harness(vec![LanguageCandidate::new("fr", 0.2)]);

        let result = h.pipeline.execute(page(), &NoopCallbacks).await.unwrap();

        assert_eq!(result.processed_page_content.full_text, page().full_text);
        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 0);
        assert!(result.processed_page_content.metadata.extra.is_empty());
    }

    #[tokio::test]
    async fn long_page_reports_condense_progress() {
        let h = harness(english());
        let recorder = Recorder::default();
        let mut long = page();
        long.full_text = (0..40)
            .map(|i| format!("Section {i}. {}", "Ownership rules apply. ".repeat(30)))
            .collect::<Vec<_>>()
            .join("\n\n");

        let result = h.pipeline.execute(long, &recorder).await.unwrap();

        let total = result.condensed_content.chunks;
        assert!(total > 1);
        let condense_events: Vec<String> = recorder
            .events()
            .into_iter()
            .filter(|e| e.starts_with("condense"))
            .collect();
        assert_eq!(condense_events.len(), total);
        assert_eq!(condense_events[0], format!("condense 1/{total}"));
        assert!(result.condensed_content.text.chars().count() <= 12_000);
    }

    #[tokio::test]
    async fn images_are_attached_before_summarizing() {
        let h = harness(english());
        let mut with_images = page();
        with_images.images = (0..7)
            .map(|i| PageImage::new(format!("https://example.com/{i}.png")))
            .collect();

        h.pipeline.execute(with_images, &NoopCallbacks).await.unwrap();

        let appended = h.host.appended();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].1.content.images().len(), 5);
        let summarize = h
            .host
            .prompts()
            .into_iter()
            .find(|p| p.text.starts_with("Summarize"))
            .unwrap();
        assert_eq!(appended[0].0, summarize.session_id);
        assert!(summarize.text.contains("The 5 images attached earlier"));
    }

    #[tokio::test]
    async fn non_json_summary_falls_back_to_raw_text() {
        let h = harness(english());
        h.host.respond_with(|prompt| {
            if prompt.text.starts_with("Summarize") {
                MockReply::text("Rust pages explain ownership.")
            } else {
                scripted(prompt)
            }
        });

        let result = h.pipeline.execute(page(), &NoopCallbacks).await.unwrap();

        assert_eq!(result.summary, "Rust pages explain ownership.");
        assert!(result.structured_data.is_empty());
    }

    #[tokio::test]
    async fn failed_clone_falls_back_to_fresh_session() {
        let h = harness(english());
        h.host.fail_clones(true);

        let result = h.pipeline.execute(page(), &NoopCallbacks).await.unwrap();

        assert_eq!(result.summary, "A page about Rust.");
        assert_eq!(h.host.created_count(), 2);
        assert_eq!(h.host.destroyed_count(), 1);
    }

    // ==================== Failure Tests ====================

    #[tokio::test]
    async fn unavailable_model_fails_acquisition() {
        let h = harness(english());
        h.host.set_availability(vec![Availability::Unavailable]);

        let err = h.pipeline.execute(page(), &NoopCallbacks).await.unwrap_err();

        assert!(matches!(err, PipelineError::SessionAcquisition(Error::ModelUnavailable(_))));
    }

    #[tokio::test]
    async fn rejected_summary_fails_run_and_destroys_session() {
        let h = harness(english());
        h.host.respond_with(|prompt| {
            if prompt.text.starts_with("Summarize") {
                MockReply::Fail("context window exceeded".into())
            } else {
                scripted(prompt)
            }
        });

        let err = h.pipeline.execute(page(), &NoopCallbacks).await.unwrap_err();

        assert!(matches!(err, PipelineError::Summarize(Error::ProviderApi(_))));
        assert_eq!(h.pipeline.pool().idle_count().await, 0);
        assert_eq!(h.host.created_count(), h.host.destroyed_count());
    }

    #[tokio::test]
    async fn failed_clone_and_create_fails_reset() {
        let h = harness(english());
        h.host.fail_clones(true);
        let recorder = Recorder::default();

        let mut state = h.pipeline.step(CaptureState::start(page()), &recorder).await.unwrap();
        h.host.fail_creates(true);
        while state.stage() != CaptureStage::ResetForSummarize {
            state = h.pipeline.step(state, &recorder).await.unwrap();
        }
        let err = h.pipeline.step(state, &recorder).await.unwrap_err();

        assert!(matches!(err, PipelineError::Reset(_)));
        assert_eq!(h.host.destroyed_count(), 1);
    }

    // ==================== step Tests ====================

    #[tokio::test]
    async fn step_walks_every_stage_in_order() {
        let h = harness(english());
        let mut state = CaptureState::start(page());
        let mut stages = vec![state.stage()];

        while !state.is_done() {
            state = tokio_test::assert_ok!(h.pipeline.step(state, &NoopCallbacks).await);
            stages.push(state.stage());
        }

        assert_eq!(
            stages,
            vec![
                CaptureStage::Start,
                CaptureStage::LanguageNormalize,
                CaptureStage::Classify,
                CaptureStage::Condense,
                CaptureStage::ResetForSummarize,
                CaptureStage::AttachImageContext,
                CaptureStage::Summarize,
                CaptureStage::Done,
            ]
        );
        let done = h.pipeline.step(state, &NoopCallbacks).await.unwrap();
        assert!(done.is_done());
    }

    // ==================== refine Tests ====================

    #[tokio::test]
    async fn refine_reuses_pooled_session() {
        let h = harness(english());
        let result = h.pipeline.execute(page(), &NoopCallbacks).await.unwrap();
        h.host.queue_reply(MockReply::text(
            r#"{"reply": "Done.", "summary": "Short.", "structuredData": {}}"#,
        ));

        let chat = h
            .pipeline
            .refine(&result.summary_response(), "shorter please")
            .await
            .unwrap();

        assert_eq!(chat.reply, "Done.");
        assert_eq!(chat.response.summary, "Short.");
        assert_eq!(h.host.created_count(), 2);
        assert_eq!(h.pipeline.pool().idle_count().await, 1);
    }

    #[tokio::test]
    async fn rejected_refinement_destroys_session() {
        let h = harness(english());
        h.host.queue_reply(MockReply::Fail("busy".into()));

        let err = h
            .pipeline
            .refine(&SummaryResponse::default(), "shorter")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Refine(_)));
        assert_eq!(h.host.destroyed_count(), 1);
        assert_eq!(h.pipeline.pool().idle_count().await, 0);
    }
}
