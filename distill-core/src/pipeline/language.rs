//! Language detection and translation.
//!
//! Both collaborators are traits so a host with native detection or
//! translation can plug its own in. The model-backed implementations open a
//! short-lived session per call, which keeps the two concurrent translation
//! calls from sharing a session.

use std::sync::Arc;

use async_trait::async_trait;
use distill_models::session::{prompt_constrained, prompt_streaming};
use distill_models::{Error, SessionManager, SessionOptions};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::callbacks::CaptureCallbacks;
use super::text::truncate_chars;
use crate::config::LanguageConfig;
use crate::page::PageContent;

/// One detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageCandidate {
    /// BCP 47 code such as `fr` or `pt-BR`.
    pub detected_language: String,
    /// Between 0 and 1.
    pub confidence: f64,
}

impl LanguageCandidate {
    pub fn new(code: impl Into<String>, confidence: f64) -> Self {
        Self {
            detected_language: code.into(),
            confidence,
        }
    }
}

/// Detects the language of a text sample.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// Candidates ranked most likely first. An empty list means unknown.
    async fn detect(&self, text: &str) -> distill_models::Result<Vec<LanguageCandidate>>;
}

/// Translates text between languages.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> distill_models::Result<String>;
}

#[derive(Debug, Deserialize)]
struct DetectionReply {
    #[serde(default)]
    languages: Vec<LanguageCandidate>,
}

/// Detector that asks the model for a constrained JSON answer.
pub struct ModelLanguageDetector {
    manager: Arc<SessionManager>,
    options: SessionOptions,
}

impl ModelLanguageDetector {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            options: SessionOptions::new(0.0, 1)
                .system_prompt("You identify the natural language of text."),
        }
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "languages": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "detectedLanguage": {"type": "string"},
                            "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                        },
                        "required": ["detectedLanguage", "confidence"]
                    }
                }
            },
            "required": ["languages"]
        })
    }
}

#[async_trait]
impl LanguageDetector for ModelLanguageDetector {
    async fn detect(&self, text: &str) -> distill_models::Result<Vec<LanguageCandidate>> {
        let prompt = format!(
            "Identify the language of the text below. List candidate BCP 47 codes \
             (for example \"en\", \"fr\", \"pt-BR\") with a confidence between 0 and 1, \
             most likely first.\n\nText:\n{text}"
        );
        let mut session = self.manager.create_session(&self.options).await?;
        let reply =
            prompt_constrained::<DetectionReply>(session.as_mut(), &prompt, &Self::schema()).await;
        session.destroy().await;
        let reply = reply?;

        let mut candidates: Vec<LanguageCandidate> = reply
            .languages
            .into_iter()
            .filter(|c| c.confidence.is_finite() && !c.detected_language.trim().is_empty())
            .map(|c| LanguageCandidate {
                detected_language: c.detected_language.trim().to_string(),
                confidence: c.confidence.clamp(0.0, 1.0),
            })
            .collect();
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(candidates)
    }
}

/// Translator that streams a plain-text translation from the model.
pub struct ModelTranslator {
    manager: Arc<SessionManager>,
    options: SessionOptions,
}

impl ModelTranslator {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            options: SessionOptions::new(0.1, 3)
                .system_prompt("You are a faithful translator. Reply with the translation only."),
        }
    }
}

#[async_trait]
impl Translator for ModelTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> distill_models::Result<String> {
        let prompt = format!(
            "Translate the following text from {source} to {target}. \
             Preserve paragraph breaks.\n\n{text}"
        );
        let mut session = self.manager.create_session(&self.options).await?;
        let translated = prompt_streaming(session.as_mut(), &prompt, |_| Ok(())).await;
        session.destroy().await;
        let translated = translated?;

        let translated = translated.trim();
        if translated.is_empty() {
            return Err(Error::MalformedModelOutput("empty translation".to_string()));
        }
        Ok(translated.to_string())
    }
}

/// Translate `page` into the target language when it is confidently in
/// another one.
///
/// Never fails: detection or translation errors leave the page unchanged.
pub async fn normalize_language(
    page: PageContent,
    detector: &dyn LanguageDetector,
    translator: &dyn Translator,
    config: &LanguageConfig,
    callbacks: &dyn CaptureCallbacks,
) -> PageContent {
    let sample = if page.full_text.trim().is_empty() {
        page.description().unwrap_or_default()
    } else {
        page.full_text.as_str()
    };
    let sample = truncate_chars(sample, config.sample_chars);
    if sample.trim().is_empty() {
        debug!(url = %page.url, "No text to detect language from");
        return page;
    }

    let candidates = match detector.detect(sample).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(url = %page.url, error = %e, "Language detection failed, skipping translation");
            return page;
        }
    };
    let Some(top) = candidates.into_iter().next() else {
        debug!(url = %page.url, "Language not detected");
        return page;
    };
    if config.is_target(&top.detected_language) || top.confidence < config.min_confidence {
        debug!(
            url = %page.url,
            language = %top.detected_language,
            confidence = top.confidence,
            "No translation needed"
        );
        return page;
    }

    let source = top.detected_language.as_str();
    let target = config.target_language.as_str();
    info!(url = %page.url, from = source, to = target, "Translating page");
    callbacks.on_translation_start(source);

    let description = page
        .metadata
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty());
    let (text, description) = tokio::join!(
        async {
            if page.full_text.trim().is_empty() {
                Ok(page.full_text.clone())
            } else {
                translator.translate(&page.full_text, source, target).await
            }
        },
        async {
            match description {
                Some(d) => translator.translate(d, source, target).await.map(Some),
                None => Ok(None),
            }
        }
    );

    let (text, description) = match (text, description) {
        (Ok(text), Ok(description)) => (text, description),
        (Err(e), _) | (_, Err(e)) => {
            warn!(url = %page.url, error = %e, "Translation failed, keeping original text");
            callbacks.on_translation_error(&e.to_string());
            return page;
        }
    };

    let mut translated = page.clone();
    translated.full_text = text;
    if description.is_some() {
        translated.metadata.description = description;
    }
    translated
        .metadata
        .extra
        .insert("originalLanguage".to_string(), json!(top.detected_language));
    translated
        .metadata
        .extra
        .insert("languageDetectionConfidence".to_string(), json!(top.confidence));

    callbacks.on_translation_complete();
    translated
}

#[cfg(test)]
mod tests {
    use super::*;
    use distill_models::mock::{MockHost, MockReply};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ==================== Test Doubles ====================

    struct FixedDetector(distill_models::Result<Vec<LanguageCandidate>>);

    impl FixedDetector {
        fn one(code: &str, confidence: f64) -> Self {
            Self(Ok(vec![LanguageCandidate::new(code, confidence)]))
        }
    }

    #[async_trait]
    impl LanguageDetector for FixedDetector {
        async fn detect(&self, _text: &str) -> distill_models::Result<Vec<LanguageCandidate>> {
            match &self.0 {
                Ok(candidates) => Ok(candidates.clone()),
                Err(e) => Err(Error::ProviderApi(e.to_string())),
            }
        }
    }

    /// Prefixes text with the target code; fails on text containing "FAIL".
    #[derive(Default)]
    struct TaggingTranslator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for TaggingTranslator {
        async fn translate(
            &self,
            text: &str,
            source: &str,
            target: &str,
        ) -> distill_models::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("FAIL") {
                return Err(Error::ProviderApi("translation refused".to_string()));
            }
            Ok(format!("[{source}->{target}] {text}"))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl CaptureCallbacks for Recorder {
        fn on_translation_start(&self, language: &str) {
            self.0.lock().unwrap().push(format!("start:{language}"));
        }
        fn on_translation_complete(&self) {
            self.0.lock().unwrap().push("complete".to_string());
        }
        fn on_translation_error(&self, _error: &str) {
            self.0.lock().unwrap().push("error".to_string());
        }
    }

    fn french_page() -> PageContent {
        let mut page = PageContent::new(
            "Recette",
            "https://example.fr/recette",
            "Mélangez la farine et le beurre.",
        );
        page.metadata.description = Some("Une tarte simple".to_string());
        page
    }

    async fn run(page: PageContent, detector: FixedDetector) -> (PageContent, usize, Vec<String>) {
        let translator = TaggingTranslator::default();
        let recorder = Recorder::default();
        let out = normalize_language(
            page,
            &detector,
            &translator,
            &LanguageConfig::default(),
            &recorder,
        )
        .await;
        let calls = translator.calls.load(Ordering::SeqCst);
        let events = recorder.0.lock().unwrap().clone();
        (out, calls, events)
    }

    // ==================== normalize_language Tests ====================

    #[tokio::test]
    async fn french_page_is_translated_and_tagged() {
        let (out, calls, events) = run(french_page(), FixedDetector::one("fr", 0.9)).await;

        assert_eq!(out.full_text, "[fr->en] Mélangez la farine et le beurre.");
        assert_eq!(out.description(), Some("[fr->en] Une tarte simple"));
        assert_eq!(out.metadata.extra["originalLanguage"], "fr");
        assert_eq!(out.metadata.extra["languageDetectionConfidence"], 0.9);
        assert_eq!(calls, 2);
        assert_eq!(events, vec!["start:fr", "complete"]);
    }

    #[tokio::test]
    async fn english_page_passes_through() {
        let page = french_page();
        let (out, calls, events) = run(page.clone(), FixedDetector::one("en", 0.99)).await;
        assert_eq!(out, page);
        assert_eq!(calls, 0);
        assert!(events.is_empty());

        let (out, calls, _) = run(page.clone(), FixedDetector::one("en-US", 0.99)).await;
        assert_eq!(out, page);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn low_confidence_passes_through() {
        let page = french_page();
        let (out, calls, _) = run(page.clone(), FixedDetector::one("fr", 0.29)).await;
        assert_eq!(out, page);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn empty_detection_passes_through() {
        let page = french_page();
        let (out, calls, _) = run(page.clone(), FixedDetector(Ok(Vec::new()))).await;
        assert_eq!(out, page);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn detection_failure_passes_through() {
        let page = french_page();
        let (out, _, _) = run(
            page.clone(),
            FixedDetector(Err(Error::ProviderApi("offline".into()))),
        )
        .await;
        assert_eq!(out, page);
    }

    #[tokio::test]
    async fn translation_failure_keeps_original_and_reports() {
        let mut page = french_page();
        page.full_text = "FAIL ce texte".to_string();
        let (out, calls, events) = run(page.clone(), FixedDetector::one("fr", 0.9)).await;

        assert_eq!(out, page);
        assert_eq!(calls, 2);
        assert_eq!(events, vec!["start:fr", "error"]);
    }

    #[tokio::test]
    async fn description_is_sampled_when_text_is_empty() {
        let mut page = french_page();
        page.full_text = String::new();
        let (out, calls, _) = run(page, FixedDetector::one("fr", 0.8)).await;

        assert_eq!(calls, 1);
        assert_eq!(out.full_text, "");
        assert_eq!(out.description(), Some("[fr->en] Une tarte simple"));
    }

    // ==================== Model Collaborator Tests ====================

    #[tokio::test]
    async fn model_detector_ranks_candidates_and_closes_session() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(
            r#"```json
{"languages": [{"detectedLanguage": "es", "confidence": 0.2},
               {"detectedLanguage": " fr ", "confidence": 0.7}]}
```"#,
        ));
        let detector = ModelLanguageDetector::new(Arc::new(SessionManager::new(Arc::new(
            host.clone(),
        ))));

        let candidates = detector.detect("Bonjour tout le monde").await.unwrap();

        assert_eq!(candidates[0], LanguageCandidate::new("fr", 0.7));
        assert_eq!(candidates[1].detected_language, "es");
        assert!(host.prompts()[0].constrained);
        assert_eq!(host.destroyed_count(), 1);
    }

    #[tokio::test]
    async fn model_translator_streams_and_trims() {
        let host = MockHost::new();
        host.queue_reply(MockReply::Chunks(vec![
            "  Hello ".into(),
            "world\n".into(),
        ]));
        let translator =
            ModelTranslator::new(Arc::new(SessionManager::new(Arc::new(host.clone()))));

        let out = translator.translate("Bonjour le monde", "fr", "en").await.unwrap();

        assert_eq!(out, "Hello world");
        let prompt = &host.prompts()[0];
        assert!(prompt.streaming);
        assert!(prompt.text.contains("from fr to en"));
        assert_eq!(host.destroyed_count(), 1);
    }

    #[tokio::test]
    async fn model_translator_rejects_empty_output() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text("   "));
        let translator =
            ModelTranslator::new(Arc::new(SessionManager::new(Arc::new(host.clone()))));

        let err = translator.translate("Hola", "es", "en").await.unwrap_err();
        assert!(matches!(err, Error::MalformedModelOutput(_)));
        assert_eq!(host.destroyed_count(), 1);
    }
}
