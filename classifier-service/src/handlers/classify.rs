use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    Json,
};
use serde_json::{Map, Value};
use service_core::error::AppError;

use crate::models::classification::{email_preview, PREVIEW_FIELD};
use crate::startup::AppState;

/// Shortest accepted email body, in characters, after trimming.
pub const MIN_EMAIL_CHARS: usize = 10;

pub const INVALID_JSON: &str = "Invalid JSON";
pub const EMAIL_TEXT_REQUIRED: &str = "email_text field is required";
pub const EMAIL_TOO_SHORT: &str = "Email too short; provide more content.";

/// Validate the raw body and return the trimmed `email_text`.
///
/// A non-object body or a non-string `email_text` counts as a missing field.
pub fn extract_email_text(body: &[u8]) -> Result<String, AppError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|_| AppError::bad_request(INVALID_JSON))?;

    let email_text = payload
        .get("email_text")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if email_text.is_empty() {
        return Err(AppError::bad_request(EMAIL_TEXT_REQUIRED));
    }

    if email_text.chars().count() < MIN_EMAIL_CHARS {
        return Err(AppError::bad_request(EMAIL_TOO_SHORT));
    }

    Ok(email_text.to_string())
}

/// `POST /api/classify`.
///
/// Input problems are 400s. Anything that goes wrong with the model is folded
/// into an `"Error"` classification and still answered with 200.
#[tracing::instrument(skip(state, body), fields(body_len = tracing::field::Empty))]
pub async fn classify_email(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Map<String, Value>>, AppError> {
    let body = body.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Failed to read request body");
        AppError::bad_request(rejection.body_text())
    })?;
    tracing::Span::current().record("body_len", body.len());

    let email_text = extract_email_text(&body).map_err(|e| {
        tracing::info!(error = %e, "Rejected classification request");
        e
    })?;

    let mut result = match state.classifier.classify(&email_text).await {
        Ok(object) => object,
        Err(e) => {
            tracing::error!(error = %e, "Classification failed");
            e.into_result().into_object()
        }
    };

    result.insert(
        PREVIEW_FIELD.to_string(),
        Value::String(email_preview(&email_text)),
    );

    Ok(Json(result))
}
