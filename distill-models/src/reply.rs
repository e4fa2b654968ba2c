//! Parsing JSON out of free-form model replies.

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Strip whitespace and a surrounding Markdown code fence from `raw`.
///
/// Models asked for JSON frequently wrap it in ```` ```json ```` fences even
/// when a schema constraint was supplied.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json", "JSON", ...) up to the first newline.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model reply as `T`.
///
/// Falls back to the outermost `{ ... }` span when the reply has prose
/// around the object.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let candidate = strip_code_fence(raw);
    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(first) => {
            let span = candidate
                .find('{')
                .zip(candidate.rfind('}'))
                .filter(|(start, end)| start < end)
                .map(|(start, end)| &candidate[start..=end]);
            match span {
                Some(object) if object.len() < candidate.len() => serde_json::from_str(object)
                    .map_err(|e| Error::MalformedModelOutput(e.to_string())),
                _ => Err(Error::MalformedModelOutput(first.to_string())),
            }
        }
    }
}
