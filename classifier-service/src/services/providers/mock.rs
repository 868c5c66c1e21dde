//! Mock provider implementation for testing.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::sync::Mutex;

/// Mock text provider that replays a canned reply and records each call.
pub struct MockTextProvider {
    reply: Result<String, ProviderError>,
    prompts: Mutex<Vec<String>>,
    params: Mutex<Vec<GenerationParams>>,
}

impl MockTextProvider {
    /// Always answers with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    /// Always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            reply: Err(error),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Generation parameters received so far, oldest first.
    pub fn params(&self) -> Vec<GenerationParams> {
        self.params
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

/// Rough token estimate (four bytes per token), saturating at `i32::MAX`.
fn estimate_tokens(text: &str) -> i32 {
    i32::try_from(text.len() / 4).unwrap_or(i32::MAX)
}

#[async_trait]
impl TextProvider for MockTextProvider {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Ok(mut seen) = self.params.lock() {
            seen.push(params.clone());
        }

        let text = self.reply.clone()?;

        Ok(ProviderResponse {
            output_tokens: estimate_tokens(&text),
            text,
            input_tokens: estimate_tokens(prompt),
            finish_reason: FinishReason::Complete,
        })
    }

    fn model(&self) -> &str {
        "mock"
    }
}
