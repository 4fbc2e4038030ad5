//! Lenient parsing of collaborator replies.
//!
//! Models are asked for `{"answer": "...", "sources": [...]}` but do not
//! always comply. [`parse_reply`] accepts, in order of preference:
//!
//! - bare JSON objects,
//! - JSON wrapped in a Markdown code fence (with or without a language tag),
//! - anything else, which becomes the answer verbatim.
//!
//! Whenever the reply does not carry its own `sources` list, the caller's
//! fallback sources are used.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer text used when the documentation answerer fails.
pub const ANSWER_UNAVAILABLE: &str = "answer unavailable";

/// Answer text used when the incident diagnoser fails.
pub const DIAGNOSIS_UNAVAILABLE: &str = "diagnosis unavailable";

/// A collaborator's answer with the references it relied on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl AgentReply {
    pub fn new(answer: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            answer: answer.into(),
            sources,
        }
    }
}

/// Remove a surrounding ```` ``` ```` fence and its optional language tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);

    // Language tag: everything up to the first newline, if it is one word.
    match inner.split_once('\n') {
        Some((tag, rest)) if !tag.trim().contains(char::is_whitespace) => rest.trim(),
        _ => inner.trim(),
    }
}

/// Parse a raw reply into an [`AgentReply`].
pub fn parse_reply(raw: &str, fallback_sources: &[String]) -> AgentReply {
    let content = strip_code_fence(raw);

    let parsed = match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => map,
        _ => return AgentReply::new(content, fallback_sources.to_vec()),
    };

    let Some(answer) = parsed.get("answer").and_then(Value::as_str) else {
        return AgentReply::new(content, fallback_sources.to_vec());
    };

    let sources = match parsed.get("sources") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => fallback_sources.to_vec(),
    };

    AgentReply::new(answer, sources)
}
