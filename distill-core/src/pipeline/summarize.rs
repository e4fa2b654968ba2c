//! Summary and structured-data extraction.

use distill_models::ModelSession;
use distill_models::reply::parse_json_reply;
use distill_models::session::prompt_streaming;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::text::clip;
use crate::normalize::normalize;
use crate::page::{CondensedPageContent, ContentType, StructuredData, SummaryResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryReply {
    summary: String,
    #[serde(default, alias = "structured_data")]
    structured_data: Value,
}

/// Keys worth extracting for each content type.
fn structured_hint(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Generic => "the most useful facts on the page",
        ContentType::Article | ContentType::News => "author, publication date, topics, key people",
        ContentType::Documentation => "project, version, APIs or commands covered, prerequisites",
        ContentType::Product => "name, brand, price, availability, key specifications",
        ContentType::Recipe => "ingredients, prep time, cook time, servings",
        ContentType::Video => "channel, duration, topics",
        ContentType::Forum => "question, accepted answer, participants",
        ContentType::Arxiv => "authors, arXiv id, subjects, contributions",
        ContentType::Github => "repository, language, license, stars, purpose",
        ContentType::Wikipedia => "subject, key dates, related entities",
    }
}

fn prompt(content: &CondensedPageContent, image_count: usize) -> String {
    let images = if image_count > 0 {
        format!(" The {image_count} images attached earlier come from this page.")
    } else {
        String::new()
    };
    format!(
        "Summarize the {content_type} page \"{title}\" ({url}).{images}\n\
         Reply with a JSON object with two fields: \"summary\", a concise summary of a few \
         sentences, and \"structuredData\", an object of key facts such as {hint}.\n\n\
         Description: {description}\n\n{text}",
        content_type = content.content_type,
        title = content.title,
        url = content.url,
        hint = structured_hint(content.content_type),
        description = content.description.as_deref().unwrap_or("(none)"),
        text = content.text,
    )
}

/// Structured data from a reply field; anything but an object is dropped.
pub(crate) fn structured_from(value: Value) -> StructuredData {
    match value {
        Value::Object(map) => normalize(&map),
        _ => StructuredData::new(),
    }
}

/// Interpret a summarization reply.
///
/// Output that is not the expected JSON becomes the summary itself, with no
/// structured data.
pub fn parse_summary(raw: &str) -> SummaryResponse {
    match parse_json_reply::<SummaryReply>(raw) {
        Ok(reply) => SummaryResponse {
            summary: reply.summary.trim().to_string(),
            structured_data: structured_from(reply.structured_data),
        },
        Err(e) => {
            warn!(error = %e, "Summary was not JSON, using raw text");
            SummaryResponse {
                summary: raw.trim().to_string(),
                structured_data: StructuredData::new(),
            }
        }
    }
}

/// Characters of page text used when the model returns no summary.
const FALLBACK_SUMMARY_CHARS: usize = 500;

/// Summary used in place of a blank model reply: the page description, else
/// the start of the page text, else the title.
fn fallback_summary(content: &CondensedPageContent) -> String {
    content
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| Some(clip(&content.text, FALLBACK_SUMMARY_CHARS)).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| content.title.trim().to_string())
}

/// Summarize condensed content on `session`.
///
/// Progress is reported as (0, 1) when the call starts and (1, 1) when it
/// completes. A blank summary is replaced with one drawn from the page. A
/// rejected prompt is returned as an error.
pub async fn summarize<F>(
    session: &mut dyn ModelSession,
    content: &CondensedPageContent,
    image_count: usize,
    mut on_progress: F,
) -> distill_models::Result<SummaryResponse>
where
    F: FnMut(usize, usize) + Send,
{
    on_progress(0, 1);
    let raw = prompt_streaming(session, &prompt(content, image_count), |_| Ok(())).await?;
    let mut response = parse_summary(&raw);
    if response.summary.is_empty() {
        warn!(url = %content.url, "Model returned an empty summary, using page text");
        response.summary = fallback_summary(content);
    }
    debug!(
        url = %content.url,
        summary_chars = response.summary.len(),
        fields = response.structured_data.len(),
        "Summarized page"
    );
    on_progress(1, 1);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use distill_models::mock::{MockHost, MockReply};
    use distill_models::{Error, ModelHost, SessionOptions};
    use serde_json::json;

    fn content() -> CondensedPageContent {
        CondensedPageContent {
            title: "Pancakes".to_string(),
            url: "https://example.com/pancakes".to_string(),
            content_type: ContentType::Recipe,
            description: None,
            text: "Mix flour, eggs and milk. Fry.".to_string(),
            source_chars: 30,
            chunks: 0,
        }
    }

    #[test]
    fn parses_and_normalizes_json_reply() {
        let out = parse_summary(
            r#"{"summary": " Fluffy pancakes. ", "structuredData": {
                "ingredients": ["flour", ["eggs", "milk"]],
                "servings": 4,
                "notes": null,
                "time": {"prep": "5 min", "cook": "10 min"}
            }}"#,
        );
        assert_eq!(out.summary, "Fluffy pancakes.");
        assert_eq!(
            serde_json::Value::Object(out.structured_data),
            json!({
                "ingredients": ["flour", "eggs", "milk"],
                "servings": 4,
                "time": "cook: 10 min; prep: 5 min"
            })
        );
    }

    #[test]
    fn non_json_reply_becomes_summary() {
        let out = parse_summary("These pancakes are fluffy and quick.");
        assert_eq!(out.summary, "These pancakes are fluffy and quick.");
        assert!(out.structured_data.is_empty());
    }

    #[test]
    fn non_object_structured_data_is_dropped() {
        let out = parse_summary(r#"{"summary": "S", "structuredData": ["a", "b"]}"#);
        assert_eq!(out.summary, "S");
        assert!(out.structured_data.is_empty());
    }

    #[tokio::test]
    async fn summarize_streams_and_reports_progress() {
        let host = MockHost::new();
        host.queue_reply(MockReply::Chunks(vec![
            "{\"summary\": \"Quick ".into(),
            "pancakes.\", \"structuredData\": {\"servings\": 2}}".into(),
        ]));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let mut progress = Vec::new();
        let out = summarize(session.as_mut(), &content(), 2, |c, t| progress.push((c, t)))
            .await
            .unwrap();

        assert_eq!(out.summary, "Quick pancakes.");
        assert_eq!(out.structured_data["servings"], 2);
        assert_eq!(progress, vec![(0, 1), (1, 1)]);
        let prompt = &host.prompts()[0];
        assert!(prompt.streaming);
        assert!(prompt.text.contains("The 2 images attached earlier"));
        assert!(prompt.text.contains("ingredients"));
    }

    #[tokio::test]
    async fn rejected_summary_is_an_error() {
        let host = MockHost::new();
        host.queue_reply(MockReply::Fail("context overflow".into()));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let mut progress = Vec::new();
        let err = summarize(session.as_mut(), &content(), 0, |c, t| progress.push((c, t)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ProviderApi(_)));
        assert_eq!(progress, vec![(0, 1)]);
    }

    // ==================== Empty Summary Tests ====================

    #[tokio::test]
    async fn empty_reply_falls_back_to_page_text() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(""));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = summarize(session.as_mut(), &content(), 0, |_, _| {})
            .await
            .unwrap();

        assert_eq!(out.summary, "Mix flour, eggs and milk. Fry.");
        assert!(out.structured_data.is_empty());
    }

    #[tokio::test]
    async fn blank_summary_field_uses_description_and_keeps_data() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(
            r#"{"summary": "   ", "structuredData": {"servings": 4}}"#,
        ));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();
        let page = CondensedPageContent {
            description: Some(" Classic breakfast pancakes. ".to_string()),
            ..content()
        };

        let out = summarize(session.as_mut(), &page, 0, |_, _| {}).await.unwrap();

        assert_eq!(out.summary, "Classic breakfast pancakes.");
        assert_eq!(out.structured_data["servings"], 4);
    }

    #[test]
    fn fallback_uses_title_when_page_has_no_text() {
        let page = CondensedPageContent {
            text: "  ".to_string(),
            ..content()
        };
        assert_eq!(fallback_summary(&page), "Pancakes");
    }
}
