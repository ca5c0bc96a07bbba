// src/llm_client.rs
//
// Client for the external generative text service (Gemini REST API).
// One logical blocking call per request from the caller's point of view,
// with bounded exponential backoff and jitter underneath. Quota and
// transient failures retry; contract errors fail fast.

use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmSettings;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key available (set {0})")]
    MissingApiKey(String),
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("transient service error: {0}")]
    Transient(String),
    #[error("service rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("service returned no usable candidates")]
    EmptyResponse,
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        matches!(self, LlmError::QuotaExceeded(_) | LlmError::Transient(_))
    }
}

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub system_instruction: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Generative text client. Built once in main and injected into every
/// consumer (analyzer, topic extractor, summarizer).
pub struct LlmClient {
    http: reqwest::Client,
    settings: LlmSettings,
    api_key: String,
}

impl LlmClient {
    pub fn new(settings: LlmSettings, api_key: String) -> Result<LlmClient, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey(settings.api_key_env.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(LlmError::ClientBuild)?;
        Ok(LlmClient { http, settings, api_key })
    }

    /// Generate text for a prompt, retrying quota and transient failures
    /// with exponential backoff and jitter. Later retries fall back to the
    /// configured lesser model. Returns the final error once the retry
    /// budget is exhausted; the caller decides how to degrade.
    pub async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError> {
        let mut model = self.settings.model.as_str();
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let delay = retry_delay(
                    attempt - 1,
                    self.settings.initial_retry_delay_ms,
                    self.settings.max_retry_delay_ms,
                );
                info!(
                    "[LlmClient] Retrying in {:.2}s (attempt {}/{})",
                    delay.as_secs_f64(),
                    attempt,
                    self.settings.max_retries
                );
                tokio::time::sleep(delay).await;

                // Later retries try the lesser model in case the primary is overloaded
                if attempt >= 2 && model != self.settings.fallback_model {
                    info!("[LlmClient] Falling back to model {}", self.settings.fallback_model);
                    model = self.settings.fallback_model.as_str();
                }
            }

            match self.generate_once(model, prompt, options).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    warn!("[LlmClient] Attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(LlmError::EmptyResponse))
    }

    async fn generate_once(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.settings.endpoint.trim_end_matches('/'),
            model,
            self.api_key
        );

        let body = GenerateRequest {
            contents: vec![Content { parts: vec![Part { text: prompt }] }],
            system_instruction: options
                .system_instruction
                .as_deref()
                .map(|text| Content { parts: vec![Part { text }] }),
            generation_config: Some(GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
            }),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(format!("network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_http_failure(status.as_u16(), body_text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transient(format!("malformed response body: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

fn classify_http_failure(status: u16, body: String) -> LlmError {
    let quota_hit = status == 429
        || body.contains("RESOURCE_EXHAUSTED")
        || body.contains("Quota exceeded")
        || body.contains("exceeds quota");
    if quota_hit {
        LlmError::QuotaExceeded(format!("HTTP {}: {:.200}", status, body))
    } else if status >= 500 {
        LlmError::Transient(format!("HTTP {}: {:.200}", status, body))
    } else {
        LlmError::Rejected { status, body }
    }
}

/// Exponential backoff with +/-10% jitter, capped at `max_ms`.
fn retry_delay(retry_count: u32, initial_ms: u64, max_ms: u64) -> Duration {
    let base = initial_ms.saturating_mul(1u64 << retry_count.min(16)) as f64;
    let capped = base.min(max_ms as f64);
    let jitter = rand::thread_rng().gen_range(-0.1..=0.1);
    Duration::from_millis((capped * (1.0 + jitter)).max(0.0) as u64)
}
