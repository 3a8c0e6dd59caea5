//! Two-stage decoding of raw oracle text.
//!
//! Stage one decodes the `{type, content, message}` envelope strictly and
//! then decodes `content` according to the declared kind. If anything in that
//! stage fails, stage two leniently extracts a human-readable `message` so
//! the conversation can carry on. Nothing here returns an error: every input
//! maps to exactly one [`Interpretation`].

use crate::reply::{QuestionInstance, StructuredOracleReply};
use bikeforge_core::specification::BikeSpecification;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const DEFAULT_COMPLETION_MESSAGE: &str =
    "Perfect! Here's your complete bike specification ready for image generation.";

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Ok(StructuredOracleReply),
    Fallback {
        message: String,
        reason: FallbackReason,
    },
    /// Nothing usable was returned, not even text.
    Unrecoverable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Not JSON, unknown kind, or content that does not fit its kind.
    Malformed(String),
    /// A completion without a specification object.
    MissingSpecification,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    message: Option<String>,
}

pub fn interpret(raw: &str) -> Interpretation {
    match decode_strict(raw) {
        Ok(reply) => Interpretation::Ok(reply),
        Err(reason) => {
            debug!(?reason, "Oracle reply did not match the structured schema");
            match extract_message(raw) {
                Some(message) => Interpretation::Fallback { message, reason },
                None => Interpretation::Unrecoverable,
            }
        }
    }
}

fn decode_strict(raw: &str) -> Result<StructuredOracleReply, FallbackReason> {
    let cleaned = strip_code_fences(raw);
    let envelope: RawEnvelope = serde_json::from_str(cleaned)
        .map_err(|e| FallbackReason::Malformed(format!("invalid envelope: {}", e)))?;
    let message = envelope
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    match envelope.kind.trim().to_ascii_lowercase().as_str() {
        "question" => {
            let question: QuestionInstance = serde_json::from_value(envelope.content)
                .map_err(|e| FallbackReason::Malformed(format!("invalid question: {}", e)))?;
            if question.question_text.trim().is_empty() {
                return Err(FallbackReason::Malformed("empty question text".to_string()));
            }
            let message = message.unwrap_or_else(|| question.question_text.clone());
            Ok(StructuredOracleReply::Question { question, message })
        }
        "completion" => {
            if !envelope.content.is_object() {
                return Err(FallbackReason::MissingSpecification);
            }
            let specification: BikeSpecification = serde_json::from_value(envelope.content)
                .map_err(|e| FallbackReason::Malformed(format!("invalid specification: {}", e)))?;
            Ok(StructuredOracleReply::Completion {
                specification,
                message: message.unwrap_or_else(|| DEFAULT_COMPLETION_MESSAGE.to_string()),
            })
        }
        "error" => {
            let explanation = match envelope.content {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            let message = message
                .or_else(|| Some(explanation.trim().to_string()).filter(|m| !m.is_empty()))
                .ok_or_else(|| FallbackReason::Malformed("error without message".to_string()))?;
            Ok(StructuredOracleReply::Error {
                explanation,
                message,
            })
        }
        other => Err(FallbackReason::Malformed(format!("unknown reply type {:?}", other))),
    }
}

/// Remove a surrounding markdown code fence (with or without a language tag).
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // drop the info string, e.g. "json"
        text = match rest.find('\n') {
            Some(newline) if !rest[..newline].contains('{') => &rest[newline + 1..],
            _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Lenient pass: the `message` of the outermost `{...}` span if it parses,
/// otherwise the raw text itself. `None` only for blank input.
fn extract_message(raw: &str) -> Option<String> {
    let cleaned = strip_code_fences(raw);

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                if let Some(Value::String(message)) = map.get("message") {
                    let message = message.trim();
                    if !message.is_empty() {
                        return Some(message.to_string());
                    }
                }
            }
        }
    }

    let text = raw.trim();
    (!text.is_empty()).then(|| text.to_string())
}
