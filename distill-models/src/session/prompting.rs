//! Prompt helpers layered over [`ModelSession`].

use serde::de::DeserializeOwned;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::providers::{ModelSession, SessionHandle};
use crate::reply::parse_json_reply;
use crate::{ContextUsage, Result};

/// Stream a reply, handing each fragment to `on_chunk`, and return the full text.
///
/// The reply stream lives only inside this call, so the underlying reader is
/// released on every exit path, including `on_chunk` returning an error.
pub async fn prompt_streaming<F>(
    session: &mut dyn ModelSession,
    input: &str,
    mut on_chunk: F,
) -> Result<String>
where
    F: FnMut(&str) -> Result<()> + Send,
{
    let mut stream = session.prompt_streaming(input).await?;
    let mut full = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        on_chunk(&chunk)?;
        full.push_str(&chunk);
    }
    Ok(full)
}

/// Prompt with a JSON schema constraint and parse the reply as `T`.
///
/// The host only treats the schema as a hint, so a reply that does not parse
/// fails with [`crate::Error::MalformedModelOutput`].
pub async fn prompt_constrained<T: DeserializeOwned>(
    session: &mut dyn ModelSession,
    input: &str,
    schema: &serde_json::Value,
) -> Result<T> {
    let raw = session.prompt(input, Some(schema)).await?;
    parse_json_reply(&raw)
}

/// Context usage of `session`.
pub fn usage(session: &dyn ModelSession) -> ContextUsage {
    session.usage()
}

/// Replace `session` with a clone that keeps its options and system prompt
/// but none of its conversation, then destroy the old session.
///
/// When cloning fails `session` is left untouched.
pub async fn reset_context(session: &mut SessionHandle) -> Result<()> {
    let fresh = session.clone_session().await?;
    let mut old = std::mem::replace(session, fresh);
    debug!(
        from = old.id(),
        to = session.id(),
        used = old.input_usage(),
        "Reset session context"
    );
    old.destroy().await;
    Ok(())
}
