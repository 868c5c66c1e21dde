//! Classification result returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Longest input excerpt echoed back in `original_email_preview`, in characters.
pub const PREVIEW_LIMIT: usize = 500;

/// Appended to the preview when the input was cut.
pub const PREVIEW_MARKER: &str = "...";

/// Fields the model is instructed to return.
pub const EXPECTED_FIELDS: [&str; 4] = ["category", "confidence", "reason", "suggested_reply"];

/// Key under which the input excerpt is attached to every result.
pub const PREVIEW_FIELD: &str = "original_email_preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    /// Needs an action or a response.
    Productive,
    /// No action needed (greetings, thanks, social messages).
    Unproductive,
    /// The model could not be reached or its answer could not be used.
    Error,
}

/// A classification as produced by this service itself, i.e. the error
/// envelope returned when the model call fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: u8,
    pub reason: String,
    pub suggested_reply: String,
}

impl ClassificationResult {
    pub fn error(reason: impl Into<String>, suggested_reply: impl Into<String>) -> Self {
        Self {
            category: Category::Error,
            confidence: 0,
            reason: reason.into(),
            suggested_reply: suggested_reply.into(),
        }
    }

    /// Flatten into a JSON object so it can carry the preview like a model
    /// answer does.
    pub fn into_object(self) -> Map<String, Value> {
        let mut object = Map::new();
        object.insert(
            "category".to_string(),
            serde_json::to_value(self.category).unwrap_or(Value::Null),
        );
        object.insert("confidence".to_string(), Value::from(self.confidence));
        object.insert("reason".to_string(), Value::String(self.reason));
        object.insert(
            "suggested_reply".to_string(),
            Value::String(self.suggested_reply),
        );
        object
    }
}

/// The first [`PREVIEW_LIMIT`] characters of `text`, plus [`PREVIEW_MARKER`]
/// when anything was cut.
pub fn email_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LIMIT) {
        Some((cut, _)) => format!("{}{}", &text[..cut], PREVIEW_MARKER),
        None => text.to_string(),
    }
}

/// Expected fields absent from a model answer.
pub fn missing_fields(object: &Map<String, Value>) -> Vec<&'static str> {
    EXPECTED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect()
}
