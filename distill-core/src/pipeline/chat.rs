//! Chat refinement of a finished capture.

use distill_models::ModelSession;
use distill_models::reply::parse_json_reply;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::summarize::structured_from;
use crate::page::{ChatResponse, SummaryResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatReply {
    reply: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default, alias = "structured_data")]
    structured_data: Option<Value>,
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reply": {"type": "string"},
            "summary": {"type": "string"},
            "structuredData": {"type": "object"}
        },
        "required": ["reply", "summary", "structuredData"]
    })
}

fn prompt(current: &SummaryResponse, message: &str) -> String {
    let current_json = serde_json::to_string_pretty(current).unwrap_or_default();
    format!(
        "Here is the current summary and structured data of a web page:\n{current_json}\n\n\
         The user asks: {message}\n\n\
         Apply the request. Reply with a JSON object with \"reply\" (a short message to the \
         user), \"summary\" and \"structuredData\" (the full updated versions)."
    )
}

/// Apply a user request to `current` and return the model's answer.
///
/// A reply that is not the expected JSON keeps `current` unchanged and uses
/// the raw text as the conversational reply. Structured data that is not an
/// object is ignored. A rejected prompt is an error.
pub async fn refine(
    session: &mut dyn ModelSession,
    current: &SummaryResponse,
    message: &str,
) -> distill_models::Result<ChatResponse> {
    let raw = session
        .prompt(&prompt(current, message), Some(&schema()))
        .await?;

    let response = match parse_json_reply::<ChatReply>(&raw) {
        Ok(reply) => ChatResponse {
            reply: reply.reply.trim().to_string(),
            response: SummaryResponse {
                summary: reply
                    .summary
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| current.summary.clone()),
                structured_data: match reply.structured_data {
                    Some(value @ Value::Object(_)) => structured_from(value),
                    Some(other) => {
                        warn!(
                            value = %other,
                            "Refined structured data was not an object, keeping current"
                        );
                        current.structured_data.clone()
                    }
                    None => current.structured_data.clone(),
                },
            },
        },
        Err(e) => {
            warn!(error = %e, "Refinement was not JSON, keeping current summary");
            ChatResponse {
                reply: raw.trim().to_string(),
                response: current.clone(),
            }
        }
    };
    debug!(session = session.id(), "Applied refinement");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StructuredData;
    use distill_models::mock::{MockHost, MockReply};
    use distill_models::{Error, ModelHost, SessionOptions};

    fn current() -> SummaryResponse {
        let mut structured_data = StructuredData::new();
        structured_data.insert("servings".to_string(), json!(4));
        SummaryResponse {
            summary: "A long summary of pancakes.".to_string(),
            structured_data,
        }
    }

    #[tokio::test]
    async fn applies_refined_summary() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(
            r#"{"reply": "Shortened.", "summary": "Pancakes.", "structuredData": {"servings": 4, "tags": [" easy "]}}"#,
        ));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = refine(session.as_mut(), &current(), "make it shorter")
            .await
            .unwrap();

        assert_eq!(out.reply, "Shortened.");
        assert_eq!(out.response.summary, "Pancakes.");
        assert_eq!(out.response.structured_data["tags"], json!(["easy"]));
        let prompt = &host.prompts()[0];
        assert!(prompt.constrained);
        assert!(prompt.text.contains("make it shorter"));
        assert!(prompt.text.contains("A long summary of pancakes."));
    }

    #[tokio::test]
    async fn missing_fields_keep_current_values() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(r#"{"reply": "Nothing to change."}"#));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = refine(session.as_mut(), &current(), "anything?").await.unwrap();

        assert_eq!(out.reply, "Nothing to change.");
        assert_eq!(out.response, current());
    }

    #[tokio::test]
    async fn non_object_structured_data_keeps_current_values() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text(
            r#"{"reply": "Done.", "summary": "Pancakes.", "structuredData": "none"}"#,
        ));
        host.queue_reply(MockReply::text(
            r#"{"reply": "Done.", "structuredData": ["servings", 4]}"#,
        ));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = refine(session.as_mut(), &current(), "shorter").await.unwrap();
        assert_eq!(out.response.summary, "Pancakes.");
        assert_eq!(out.response.structured_data, current().structured_data);

        let out = refine(session.as_mut(), &current(), "again").await.unwrap();
        assert_eq!(out.response, current());
    }

    #[tokio::test]
    async fn unparsable_reply_preserves_previous_state() {
        let host = MockHost::new();
        host.queue_reply(MockReply::text("Sure, I made it shorter!"));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let out = refine(session.as_mut(), &current(), "shorter").await.unwrap();

        assert_eq!(out.reply, "Sure, I made it shorter!");
        assert_eq!(out.response, current());
    }

    #[tokio::test]
    async fn rejected_prompt_is_an_error() {
        let host = MockHost::new();
        host.queue_reply(MockReply::Fail("quota".into()));
        let mut session = host.create(&SessionOptions::default()).await.unwrap();

        let err = refine(session.as_mut(), &current(), "shorter").await.unwrap_err();
        assert!(matches!(err, Error::ProviderApi(_)));
    }
}
