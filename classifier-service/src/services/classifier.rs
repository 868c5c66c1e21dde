//! Email classification on top of a [`TextProvider`].
//!
//! Builds the instruction prompt, calls the model once, strips a markdown
//! fence from the answer and parses it as a JSON object. Every failure is
//! reported as a [`ClassifyError`], which converts into the `"Error"`
//! classification returned to callers with HTTP 200.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::providers::{GenerationParams, ProviderError, TextProvider};
use crate::models::classification::{missing_fields, ClassificationResult};

const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("AI credential not configured")]
    NotConfigured,

    #[error("Invalid AI response format: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl ClassifyError {
    /// The structured result handed back to the caller for this failure.
    pub fn into_result(self) -> ClassificationResult {
        match self {
            ClassifyError::NotConfigured => ClassificationResult::error(
                self.to_string(),
                "AI API key not configured. Set GEMINI_API_KEY in the deployment environment.",
            ),
            ClassifyError::MalformedResponse(_) => {
                ClassificationResult::error(self.to_string(), "Error processing AI response.")
            }
            ClassifyError::Provider(ref err) => ClassificationResult::error(
                err.to_string(),
                format!("Error communicating with the AI service: {}", err),
            ),
        }
    }
}

/// Classifies email text with the configured model. Cheap to clone.
#[derive(Clone)]
pub struct EmailClassifier {
    provider: Option<Arc<dyn TextProvider>>,
    params: GenerationParams,
}

impl EmailClassifier {
    pub fn new(provider: Option<Arc<dyn TextProvider>>) -> Self {
        Self {
            provider,
            params: GenerationParams::default(),
        }
    }

    /// Sampling settings forwarded with every model call.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Ask the model to classify `email_text`.
    ///
    /// On success the model's JSON object is returned as-is.
    pub async fn classify(&self, email_text: &str) -> Result<Map<String, Value>, ClassifyError> {
        let provider = self.provider.as_ref().ok_or(ClassifyError::NotConfigured)?;

        let prompt = build_prompt(email_text);
        let response = provider.generate(&prompt, &self.params).await?;

        let object = parse_answer(&response.text)?;

        let missing = missing_fields(&object);
        if !missing.is_empty() {
            tracing::warn!(
                model = provider.model(),
                missing = ?missing,
                "Model answer lacks expected fields; relaying as-is"
            );
        }

        tracing::info!(
            model = provider.model(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            category = ?object.get("category"),
            "Email classified"
        );

        Ok(object)
    }
}

/// The instruction sent to the model, with `email_text` embedded verbatim.
pub fn build_prompt(email_text: &str) -> String {
    format!(
        r#"
You are an email classification assistant for a financial services company.

TASK: Analyze the email below and:
1. Classify it as "Productive" or "Unproductive"
2. Write an appropriate automatic reply

DEFINITIONS:
- **Productive**: Emails that require an action or a response (e.g. support requests, questions about the system, case status updates)
- **Unproductive**: Emails that need no immediate action (e.g. greetings, thanks, social messages)

EMAIL:
{email_text}

RESPOND EXACTLY in this JSON format (no markdown):
{{
    "category": "Productive" or "Unproductive",
    "confidence": number between 0 and 100,
    "reason": "short explanation of the classification",
    "suggested_reply": "appropriate, professional automatic reply"
}}
"#
    )
}

/// Remove a markdown code fence around the model's answer.
///
/// Only a leading fence is recognised: the text between the first and second
/// fence markers is kept, minus an optional `json` language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with(FENCE) {
        return text;
    }

    let inner = text.split(FENCE).nth(1).unwrap_or_default();
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

fn parse_answer(text: &str) -> Result<Map<String, Value>, ClassifyError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ClassifyError::MalformedResponse(e.to_string()))?;

    match value {
        Value::Object(object) => Ok(object),
        other => Err(ClassifyError::MalformedResponse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
