//! Content-type classification for generic pages.

use distill_models::ModelSession;
use distill_models::session::prompt_constrained;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::text::truncate_chars;
use crate::page::{ContentType, PageContent};

/// Characters of page text shown to the classifier.
const CLASSIFY_SAMPLE_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Classification {
    content_type: ContentType,
}

fn schema() -> serde_json::Value {
    let names: Vec<&str> = ContentType::ALL.iter().map(|t| t.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "contentType": {"type": "string", "enum": names}
        },
        "required": ["contentType"]
    })
}

fn prompt(page: &PageContent) -> String {
    let names: Vec<&str> = ContentType::ALL.iter().map(|t| t.as_str()).collect();
    format!(
        "Classify this web page as one of: {}.\n\nTitle: {}\nURL: {}\nDescription: {}\n\n{}",
        names.join(", "),
        page.title,
        page.url,
        page.description().unwrap_or("(none)"),
        truncate_chars(&page.full_text, CLASSIFY_SAMPLE_CHARS)
    )
}

/// Refine the content type of a generic page.
///
/// Types assigned by a specialized extractor are kept without asking the
/// model. A failed classification keeps the original type.
pub async fn classify(page: PageContent, session: &mut dyn ModelSession) -> PageContent {
    if !page.content_type().is_generic() {
        debug!(
            url = %page.url,
            content_type = %page.content_type(),
            "Trusting extractor content type"
        );
        return page;
    }

    match prompt_constrained::<Classification>(session, &prompt(&page), &schema()).await {
        Ok(Classification { content_type }) => {
            debug!(url = %page.url, %content_type, "Classified page");
            let mut classified = page;
            classified.metadata.content_type = content_type;
            classified
        }
        Err(e) => {
            warn!(url = %page.url, error = %e, "Classification failed, keeping generic");
            page
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distill_models::mock::{MockHost, MockReply};
    use distill_models::{ModelHost, SessionOptions};

    fn page(content_type: ContentType) -> PageContent {
        let mut page = PageContent::new(
            "Attention Is All You Need",
            "https://arxiv.org/abs/1706.03762",
            "We propose a new simple network architecture, the Transformer.",
        );
        page.metadata.content_type = content_type;
        page
    }

    #[tokio::test]
    async fn specialized_type_skips_the_model() {
        let host = MockHost::new();
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = classify(page(ContentType::Arxiv), session.as_mut()).await;

        assert_eq!(out.content_type(), ContentType::Arxiv);
        assert!(host.prompts().is_empty());
    }

    #[tokio::test]
    async fn generic_page_takes_model_type() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(r#"{"contentType": "documentation"}"#));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = classify(page(ContentType::Generic), session.as_mut()).await;

        assert_eq!(out.content_type(), ContentType::Documentation);
        let prompt = &host.prompts()[0];
        assert!(prompt.constrained);
        assert!(prompt.text.starts_with("Classify this web page"));
    }

    #[tokio::test]
    async fn unknown_label_keeps_generic() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(r#"{"contentType": "poem"}"#));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = classify(page(ContentType::Generic), session.as_mut()).await;

        assert_eq!(out.content_type(), ContentType::Generic);
    }

    #[tokio::test]
    async fn rejected_prompt_keeps_generic() {
        let host = MockHost::new();
        host.queue_reply(MockReply::Fail("busy".into()));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = classify(page(ContentType::Generic), session.as_mut()).await;

        assert_eq!(out.content_type(), ContentType::Generic);
    }

    #[test]
    fn schema_lists_every_type() {
        let schema = schema();
        let names = schema["properties"]["contentType"]["enum"].as_array().unwrap();
        assert_eq!(names.len(), ContentType::ALL.len());
        assert_eq!(names[0], "generic");
    }
}
