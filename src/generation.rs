//! Text generation provider abstraction.
//!
//! The answer composer hands a fully built prompt to a [`GenerationProvider`]
//! and gets text back. Implementations:
//! - **[`DisabledGenerator`]**: always fails; answers degrade to the fallback text.
//! - **[`GeminiGenerator`]**: Gemini `generateContent`.
//! - **[`OllamaGenerator`]**: a local Ollama instance's `/api/generate`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::config_bail;
use crate::http::{self, RetryPolicy};

/// Sampling settings passed with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

/// A prompt-in, text-out model.
///
/// An `Ok` with empty text is a valid response; the caller decides what an
/// empty answer means. `Err` means the service failed after its retries.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

// ============ Gemini ============

pub struct GeminiGenerator {
    model: String,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub const DEFAULT_MODEL: &'static str = "gemini-1.5-flash";

    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => config_bail!(
                "{} environment variable not set (required by the gemini generation provider)",
                config.api_key_env
            ),
        };
        let policy = RetryPolicy::new(
            config.max_retries,
            config.timeout_secs,
            config.retry_backoff_ms,
        );
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key,
            client: policy.client()?,
            policy,
        })
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": params.temperature,
                "topP": params.top_p,
                "maxOutputTokens": params.max_tokens,
            }
        });
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let json = http::post_json(
            &self.client,
            &self.policy,
            "Gemini generation",
            &url,
            &[("x-goog-api-key", self.api_key.as_str())],
            &body,
        )
        .await?;
        parse_gemini_text(&json)
    }
}

/// Concatenates the text parts of the first candidate.
fn parse_gemini_text(json: &serde_json::Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates returned");
            anyhow::anyhow!("Invalid Gemini response: {}", reason)
        })?;

    let text = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default();
    Ok(text)
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = match &config.model {
            Some(m) => m.clone(),
            None => config_bail!("generation.model required for Ollama provider"),
        };
        let policy = RetryPolicy::new(
            config.max_retries,
            config.timeout_secs,
            config.retry_backoff_ms,
        );
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: policy.client()?,
            policy,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "top_p": params.top_p,
                "num_predict": params.max_tokens,
            }
        });
        let url = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let json = http::post_json(&self.client, &self.policy, "Ollama generation", &url, &[], &body)
            .await
            .map_err(|e| anyhow::anyhow!("{} (is Ollama running at {}?)", e, self.url))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

/// Create the configured [`GenerationProvider`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => config_bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;

    #[test]
    fn test_params_from_config() {
        let config = GenerationConfig {
            max_tokens: 600,
            temperature: 0.3,
            ..GenerationConfig::default()
        };
        let params = GenerationParams::from(&config);
        assert_eq!(params.max_tokens, 600);
        assert!((params.temperature - 0.3).abs() < 1e-6);
        assert!((params.top_p - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_parse_gemini_text_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Tuition is " }, { "text": "1,20,000." }] }
            }]
        });
        assert_eq!(parse_gemini_text(&json).unwrap(), "Tuition is 1,20,000.");
    }

    #[test]
    fn test_parse_gemini_text_empty_candidate_is_ok() {
        let json = serde_json::json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        assert_eq!(parse_gemini_text(&json).unwrap(), "");
    }

    #[test]
    fn test_parse_gemini_blocked_prompt_is_error() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_text(&json).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_disabled_generator_errors() {
        let err = DisabledGenerator
            .generate("hi", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_create_generator() {
        let gen = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(gen.model_name(), "disabled");

        let config = GenerationConfig {
            provider: "gemini".to_string(),
            api_key_env: "GROUNDWORK_TEST_MISSING_GEN_KEY".to_string(),
            ..GenerationConfig::default()
        };
        let err = create_generator(&config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::Configuration(_))
        ));
    }
}
