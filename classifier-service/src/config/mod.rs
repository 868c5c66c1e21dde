use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

use crate::services::providers::GenerationParams;

/// Google Generative Language API root.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when `GEMINI_MODEL` is not set.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub common: core_config::Config,
    pub gemini: GeminiSettings,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    /// `None` when the credential is absent or empty. The service still
    /// starts; classification degrades to an error result.
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub api_base: String,
    /// No outbound timeout unless set. Never zero.
    pub timeout_secs: Option<u64>,
    /// Sampling temperature; the model's own default when unset.
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<i32>,
}

impl GeminiSettings {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        }
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            timeout_secs: None,
            temperature: None,
            max_output_tokens: None,
        }
    }
}

impl ClassifierConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        Ok(ClassifierConfig {
            common: common_config,
            gemini: GeminiSettings {
                api_key: optional_env("GEMINI_API_KEY").map(Secret::new),
                model: optional_env("GEMINI_MODEL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                api_base: optional_env("GEMINI_API_BASE")
                    .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
                timeout_secs: optional_env("GEMINI_TIMEOUT_SECS")
                    .map(|v| parse_secs("GEMINI_TIMEOUT_SECS", &v))
                    .transpose()?,
                temperature: optional_env("GEMINI_TEMPERATURE")
                    .map(|v| parse_temperature("GEMINI_TEMPERATURE", &v))
                    .transpose()?,
                max_output_tokens: optional_env("GEMINI_MAX_OUTPUT_TOKENS")
                    .map(|v| parse_positive("GEMINI_MAX_OUTPUT_TOKENS", &v))
                    .transpose()?,
            },
            otlp_endpoint: optional_env("OTLP_ENDPOINT"),
        })
    }
}

/// Read an environment variable, treating an empty or whitespace-only value
/// as unset.
fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn invalid(key: &str, value: &str, reason: impl Display) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(
        "{} has invalid value '{}': {}",
        key,
        value,
        reason
    ))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| invalid(key, value, e))
}

/// A timeout of zero would fail every outbound call, so it is rejected.
fn parse_secs(key: &str, value: &str) -> Result<u64, AppError> {
    match parse_value::<u64>(key, value)? {
        0 => Err(invalid(key, value, "must be at least 1 second")),
        secs => Ok(secs),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<i32, AppError> {
    match parse_value::<i32>(key, value)? {
        n if n > 0 => Ok(n),
        _ => Err(invalid(key, value, "must be positive")),
    }
}

fn parse_temperature(key: &str, value: &str) -> Result<f32, AppError> {
    let temperature: f32 = parse_value(key, value)?;
    if (0.0..=2.0).contains(&temperature) {
        Ok(temperature)
    } else {
        Err(invalid(key, value, "must be between 0.0 and 2.0"))
    }
}
