//! Condensation of page text into the context budget.

use distill_models::SessionHandle;
use distill_models::session::reset_context;
use tracing::{debug, warn};

use super::text::{clip, split_chunks};
use crate::config::CondenseConfig;
use crate::page::{CondensedPageContent, PageContent};

/// Smallest per-chunk output budget, in characters.
const MIN_CHUNK_BUDGET: usize = 200;

fn chunk_prompt(page: &PageContent, chunk: &str, index: usize, total: usize, budget: usize) -> String {
    format!(
        "Condense part {index} of {total} of the page \"{title}\" to at most {budget} characters. \
         Keep facts, names, numbers and dates. Drop navigation, ads and repetition. \
         Reply with the condensed text only.\n\n{chunk}",
        title = page.title
    )
}

/// Produce text for `page` that fits `config.max_chars`.
///
/// Text already within budget is used as-is. Longer text is condensed chunk
/// by chunk on `session`, calling `on_progress(current, total)` before each
/// chunk. Between chunks the session context is reset once its usage reaches
/// `reset_threshold_percent`. A chunk the model fails on is replaced by a
/// clipped excerpt.
pub async fn condense<F>(
    page: &PageContent,
    session: &mut SessionHandle,
    config: &CondenseConfig,
    reset_threshold_percent: f64,
    mut on_progress: F,
) -> CondensedPageContent
where
    F: FnMut(usize, usize) + Send,
{
    let text = page.full_text.trim();
    let source_chars = text.chars().count();
    let condensed = |text: String, chunks: usize| CondensedPageContent {
        title: page.title.clone(),
        url: page.url.clone(),
        content_type: page.content_type(),
        description: page.metadata.description.clone(),
        text,
        source_chars,
        chunks,
    };

    if source_chars <= config.max_chars {
        debug!(url = %page.url, source_chars, "Page fits context budget");
        return condensed(text.to_string(), 0);
    }

    let chunks = split_chunks(text, config.chunk_chars);
    let total = chunks.len();
    let budget = (config.max_chars / total.max(1)).max(MIN_CHUNK_BUDGET);
    debug!(url = %page.url, source_chars, total, budget, "Condensing page");

    let mut parts = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && session.usage().percent_used >= reset_threshold_percent {
            if let Err(e) = reset_context(session).await {
                warn!(url = %page.url, error = %e, "Context reset between chunks failed");
            }
        }

        on_progress(i + 1, total);
        let prompt = chunk_prompt(page, chunk, i + 1, total, budget);
        let part = match session.prompt(&prompt, None).await {
            Ok(reply) if !reply.trim().is_empty() => clip(&reply, budget),
            Ok(_) => {
                warn!(url = %page.url, chunk = i + 1, "Empty condensation, using excerpt");
                clip(chunk, budget)
            }
            Err(e) => {
                warn!(url = %page.url, chunk = i + 1, error = %e, "Condensation failed, using excerpt");
                clip(chunk, budget)
            }
        };
        parts.push(part);
    }

    condensed(clip(&parts.join("\n\n"), config.max_chars), total)
}
