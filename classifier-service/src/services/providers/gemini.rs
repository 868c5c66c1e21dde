//! Gemini AI provider implementation.
//!
//! Non-streaming text generation against Google's Generative Language API.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GeminiSettings;

/// Header carrying the API key, kept out of the URL so it never shows up in
/// reqwest error messages.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub api_base: String,
    pub timeout: Option<Duration>,
}

impl GeminiConfig {
    /// Builds provider config from settings; `None` when no credential is set.
    pub fn from_settings(settings: &GeminiSettings) -> Option<Self> {
        settings.api_key.as_ref().map(|api_key| Self {
            api_key: api_key.clone(),
            model: settings.model.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Gemini text provider.
pub struct GeminiTextProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiTextProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_base, self.config.model, method
        )
    }
}

fn build_request(prompt: &str, params: &GenerationParams) -> GenerateContentRequest {
    let generation_config = if params.temperature.is_none() && params.max_tokens.is_none() {
        None
    } else {
        Some(GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
        })
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(prompt.to_string()),
            }],
        }],
        generation_config,
    }
}

/// Pull the first candidate's text out of an API response.
fn extract_response(
    api_response: GenerateContentResponse,
) -> Result<ProviderResponse, ProviderError> {
    let usage = api_response.usage_metadata.unwrap_or_default();

    let Some(candidate) = api_response.candidates.into_iter().next() else {
        if api_response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .is_some()
        {
            return Err(ProviderError::ContentFiltered);
        }
        return Err(ProviderError::EmptyResponse);
    };

    let finish_reason = FinishReason::from_api(candidate.finish_reason.as_deref());
    if finish_reason == FinishReason::ContentFilter {
        return Err(ProviderError::ContentFiltered);
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    Ok(ProviderResponse {
        text,
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage.candidates_token_count.unwrap_or(0),
        finish_reason,
    })
}

#[async_trait]
impl TextProvider for GeminiTextProvider {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = build_request(prompt, params);
        let url = self.api_url("generateContent");

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let result = extract_response(api_response)?;

        tracing::debug!(
            model = %self.config.model,
            input_tokens = result.input_tokens,
            output_tokens = result.output_tokens,
            finish_reason = ?result.finish_reason,
            "Gemini response received"
        );

        Ok(result)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        extract::State,
        http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
        routing::post,
        Router,
    };
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn parse(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn request_body_uses_camel_case_and_omits_empty_config() {
        let body =
            serde_json::to_value(build_request("hi", &GenerationParams::default())).unwrap();
        assert_eq!(
            body,
            json!({ "contents": [{ "role": "user", "parts": [{ "text": "hi" }] }] })
        );

        let params = GenerationParams {
            temperature: Some(0.2),
            max_tokens: Some(256),
        };
        let body = serde_json::to_value(build_request("hi", &params)).unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let response = extract_response(parse(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 4 }
        })))
        .unwrap();

        assert_eq!(response.text, "{\"a\":1}");
        assert_eq!(response.input_tokens, 12);
        assert_eq!(response.output_tokens, 4);
        assert_eq!(response.finish_reason, FinishReason::Complete);
    }

    #[test]
    fn safety_finish_is_content_filtered() {
        let err = extract_response(parse(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        })))
        .unwrap_err();
        assert_eq!(err, ProviderError::ContentFiltered);
    }

    #[test]
    fn blocked_prompt_is_content_filtered() {
        let err = extract_response(parse(json!({
            "promptFeedback": { "blockReason": "OTHER" }
        })))
        .unwrap_err();
        assert_eq!(err, ProviderError::ContentFiltered);
    }

    #[test]
    fn no_candidates_is_empty_response() {
        let err = extract_response(parse(json!({}))).unwrap_err();
        assert_eq!(err, ProviderError::EmptyResponse);
    }

    #[test]
    fn config_requires_api_key() {
        let mut settings = GeminiSettings::default();
        assert!(GeminiConfig::from_settings(&settings).is_none());

        settings.api_key = Some(Secret::new("k".to_string()));
        settings.api_base = "http://localhost:9000/".to_string();
        let config = GeminiConfig::from_settings(&settings).unwrap();
        assert_eq!(config.api_base, "http://localhost:9000");

        let provider = GeminiTextProvider::new(config).unwrap();
        assert_eq!(
            provider.api_url("generateContent"),
            "http://localhost:9000/models/gemini-2.5-flash:generateContent"
        );
    }

    /// What the fake API saw of one call.
    #[derive(Debug, Clone)]
    struct SeenCall {
        path: String,
        query: Option<String>,
        api_key: Option<String>,
        body: Value,
    }

    #[derive(Clone)]
    struct FakeGemini {
        status: StatusCode,
        reply: &'static str,
        calls: Arc<Mutex<Vec<SeenCall>>>,
    }

    async fn fake_generate(
        State(fake): State<FakeGemini>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, [(axum::http::HeaderName, &'static str); 1], &'static str) {
        fake.calls.lock().unwrap().push(SeenCall {
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            api_key: headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });
        (fake.status, [(CONTENT_TYPE, "application/json")], fake.reply)
    }

    /// Serve one canned answer on a random local port and point a provider at it.
    async fn provider_against(
        status: StatusCode,
        reply: &'static str,
    ) -> (GeminiTextProvider, Arc<Mutex<Vec<SeenCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fake = FakeGemini {
            status,
            reply,
            calls: calls.clone(),
        };
        let app = Router::new()
            .route("/v1beta/models/:call", post(fake_generate))
            .with_state(fake);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new("test-key".to_string()),
            model: "gemini-test".to_string(),
            api_base: format!("http://{}/v1beta", addr),
            timeout: Some(Duration::from_secs(5)),
        })
        .unwrap();

        (provider, calls)
    }

    const GOOD_REPLY: &str = r#"{
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": "{\"category\":\"Productive\"}" }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 30, "candidatesTokenCount": 7 }
    }"#;

    #[tokio::test]
    async fn generate_sends_key_in_header_and_returns_text() {
        let (provider, calls) = provider_against(StatusCode::OK, GOOD_REPLY).await;
        let params = GenerationParams {
            temperature: Some(0.2),
            max_tokens: None,
        };

        let response = provider.generate("classify this", &params).await.unwrap();

        assert_eq!(response.text, r#"{"category":"Productive"}"#);
        assert_eq!(response.input_tokens, 30);
        assert_eq!(response.output_tokens, 7);

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.path, "/v1beta/models/gemini-test:generateContent");
        assert_eq!(call.query, None);
        assert_eq!(call.api_key.as_deref(), Some("test-key"));
        assert_eq!(call.body["contents"][0]["parts"][0]["text"], "classify this");
        let temperature = call.body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let (provider, _) =
            provider_against(StatusCode::TOO_MANY_REQUESTS, r#"{"error":"quota"}"#).await;

        let err = provider
            .generate("classify this", &GenerationParams::default())
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::RateLimited);
    }

    #[tokio::test]
    async fn other_error_status_is_api_error_with_body() {
        let (provider, _) =
            provider_against(StatusCode::INTERNAL_SERVER_ERROR, "backend exploded").await;

        let err = provider
            .generate("classify this", &GenerationParams::default())
            .await
            .unwrap_err();

        let message = match err {
            ProviderError::ApiError(message) => message,
            other => panic!("expected ApiError, got {:?}", other),
        };
        assert!(message.contains("500"), "{message}");
        assert!(message.contains("backend exploded"), "{message}");
        assert!(!message.contains("test-key"));
    }

    #[tokio::test]
    async fn unparseable_success_body_is_api_error() {
        let (provider, _) = provider_against(StatusCode::OK, "this is not json").await;

        let err = provider
            .generate("classify this", &GenerationParams::default())
            .await
            .unwrap_err();

        let message = match err {
            ProviderError::ApiError(message) => message,
            other => panic!("expected ApiError, got {:?}", other),
        };
        assert!(message.starts_with("Failed to parse response"), "{message}");
    }

    #[tokio::test]
    async fn unreachable_api_is_network_error() {
        let provider = GeminiTextProvider::new(GeminiConfig {
            api_key: Secret::new("test-key".to_string()),
            model: "gemini-test".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            timeout: Some(Duration::from_secs(5)),
        })
        .unwrap();

        let err = provider
            .generate("classify this", &GenerationParams::default())
            .await
            .unwrap_err();

        let message = match err {
            ProviderError::NetworkError(message) => message,
            other => panic!("expected NetworkError, got {:?}", other),
        };
        assert!(!message.contains("test-key"));
    }
}
