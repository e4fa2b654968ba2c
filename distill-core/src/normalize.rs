//! Structured-data normalization
//!
//! Model output is permissive: values may be null, padded, nested arrays, or
//! whole objects. `normalize` reduces a mapping to scalars and flat arrays of
//! scalars, rendering nested objects as one readable string.

use serde_json::{Map, Value};

use crate::page::StructuredData;

/// Normalize every entry of `data`, dropping those that end up empty.
pub fn normalize(data: &StructuredData) -> StructuredData {
    data.iter()
        .filter_map(|(key, value)| normalize_value(value).map(|v| (key.clone(), v)))
        .collect()
}

/// Normalize one value. `None` means the value carries nothing worth keeping.
pub fn normalize_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Bool(_) | Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| Value::String(trimmed.to_string()))
        }
        Value::Array(items) => {
            let mut flat = Vec::with_capacity(items.len());
            for item in items {
                match normalize_value(item) {
                    Some(Value::Array(inner)) => flat.extend(inner),
                    Some(v) => flat.push(v),
                    None => {}
                }
            }
            (!flat.is_empty()).then_some(Value::Array(flat))
        }
        Value::Object(map) => {
            let text = stringify_object(map);
            (!text.is_empty()).then_some(Value::String(text))
        }
    }
}

/// Render any value as display text.
///
/// Arrays join with `", "`, objects render as `"key: value"` pairs joined with
/// `"; "`. Null and blank parts are skipped.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => stringify_object(map),
    }
}

fn stringify_object(map: &Map<String, Value>) -> String {
    map.iter()
        .filter_map(|(key, value)| {
            let text = stringify(value);
            (!text.is_empty()).then(|| format!("{key}: {text}"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}
