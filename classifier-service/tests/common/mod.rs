#![allow(dead_code)]

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use classifier_service::config::{ClassifierConfig, GeminiSettings};
use classifier_service::services::providers::mock::MockTextProvider;
use classifier_service::services::providers::TextProvider;
use classifier_service::{build_router, AppState};
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use tower::util::ServiceExt;

pub fn test_config(api_key: Option<&str>) -> ClassifierConfig {
    ClassifierConfig {
        common: CoreConfig {
            port: 0,
            log_level: "error".to_string(),
        },
        gemini: GeminiSettings {
            api_key: api_key.map(|k| Secret::new(k.to_string())),
            ..GeminiSettings::default()
        },
        otlp_endpoint: None,
    }
}

/// Router backed by a mock model; the credential counts as configured.
pub fn app_with_provider(provider: MockTextProvider) -> (Router, Arc<MockTextProvider>) {
    let provider = Arc::new(provider);
    let dyn_provider: Arc<dyn TextProvider> = provider.clone();
    let state = AppState::new(test_config(Some("test-api-key")), Some(dyn_provider));
    (build_router(state), provider)
}

/// Router with no credential, as when `GEMINI_API_KEY` is unset.
pub fn app_without_credential() -> Router {
    build_router(AppState::new(test_config(None), None))
}

pub fn classify_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/classify")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub fn classify_json(email_text: &str) -> Request<Body> {
    classify_request(serde_json::json!({ "email_text": email_text }).to_string())
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    TestResponse {
        status,
        headers,
        body,
    }
}
