use super::SqlGenerator;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, MAX_GENERATOR_TIMEOUT_SECS};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiCandidateContent,
}

#[derive(Deserialize, Default)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

/// Gemini `generateContent` client. One pooled HTTP client per instance.
pub struct GeminiClient {
    client: reqwest::Client,
    config: LLMConfig,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: LLMConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("Missing API key for Gemini".to_string()))?;

        let timeout =
            Duration::from_secs(config.timeout_secs.clamp(1, MAX_GENERATOR_TIMEOUT_SECS));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_key,
            timeout,
        })
    }

    /// Overrides the hard timeout (never above the configured ceiling).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(Duration::from_secs(MAX_GENERATOR_TIMEOUT_SECS));
        self
    }

    fn endpoint(&self) -> String {
        let base_url = self.config.base_url.trim_end_matches('/');
        format!("{}/{}:generateContent", base_url, self.config.model.trim())
    }

    async fn request(&self, url: &str, prompt: &str) -> Result<String> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: Some(GenerationConfig {
                temperature: self.config.temperature.unwrap_or(0.0) as f64,
                max_output_tokens: self.config.max_tokens,
            }),
        };

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GeneratorError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::GeneratorError(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::GeneratorError(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl SqlGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = self.endpoint();
        debug!(endpoint = %url, model = %self.config.model, "Calling generator");

        let body = tokio::time::timeout(self.timeout, self.request(&url, prompt))
            .await
            .map_err(|_| {
                AppError::GeneratorError(format!(
                    "Timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })
            .and_then(|r| r)
            .map_err(|e| {
                error!(endpoint = %url, error = %e, "Generator call failed");
                e
            })?;

        let text = extract_generated_text(&body);
        if text.trim().is_empty() {
            return Err(AppError::GeneratorError(
                "Empty response from generator".to_string(),
            ));
        }
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Pulls the generated text out of a Gemini candidate envelope, a small
/// `{"sql": ...}`/`{"text": ...}` object, or plain text.
fn extract_generated_text(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<GeminiResponse>(body) {
        let candidate_text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text);
        if let Some(text) = candidate_text {
            return unwrap_envelope(&text);
        }
    }
    unwrap_envelope(body)
}

fn unwrap_envelope(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text.trim()) {
        Ok(serde_json::Value::Object(map)) => ["sql", "text", "output"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string(),
        Ok(serde_json::Value::String(s)) => s,
        _ => text.to_string(),
    }
}
