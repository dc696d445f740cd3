//! Parse raw oracle text into a field map.
//!
//! Even when told "valid JSON only", vision models wrap their answer in a
//! ```` ```json ```` fence, prefix it with a sentence, or trail off with a
//! remark. This module recovers the JSON object when one is there and fails
//! loudly when it is not. It never guesses fields out of prose.

use crate::output::FieldMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Why a response could not be turned into a field map.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("oracle response is empty")]
    Empty,

    #[error("no JSON object found in oracle response: {snippet:?}")]
    NoObject { snippet: String },

    #[error("oracle response is not valid JSON: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("oracle response is JSON but not an object (got {kind})")]
    NotAnObject { kind: &'static str },
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Parse an oracle response into a JSON object.
///
/// Steps: trim, strip an outer code fence, try the whole text, then fall back
/// to the span between the first `{` and the last `}`.
pub fn parse_fields(raw: &str) -> Result<FieldMap, ParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let text = match RE_OUTER_FENCE.captures(text) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => text,
    };

    let candidate = if text.starts_with('{') || text.starts_with('[') {
        text
    } else {
        match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => &text[start..=end],
            _ => {
                return Err(ParseError::NoObject {
                    snippet: text.chars().take(80).collect(),
                })
            }
        }
    };

    match serde_json::from_str::<Value>(candidate)? {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::NotAnObject {
            kind: json_kind(&other),
        }),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
