//! Chat-completion API client.
//!
//! - [`AskAsync`]: the seam the composer talks to
//! - [`ChatCompletionClient`]: OpenAI-compatible implementation over `reqwest`
//!
//! Every call is a single attempt. Transport failures, timeouts and non-2xx
//! responses all surface as [`ReportError::AiService`]; nothing is retried and
//! nothing is cached.

use crate::config::{AiSettings, ProxySettings};
use crate::error::{ReportError, Result};
use crate::utils::{build_http_client, truncate_for_log};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Trait for async LLM interaction.
pub trait AskAsync {
    /// Send a system instruction and a user prompt, returning the model's text.
    async fn ask(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionClient {
    pub fn new(settings: &AiSettings, proxy: Option<&ProxySettings>) -> Result<Self> {
        let client = build_http_client(settings.timeout, proxy)
            .map_err(|e| ReportError::ai_service(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                settings.base_url.as_str().trim_end_matches('/')
            ),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AskAsync for ChatCompletionClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model, prompt_chars = prompt.chars().count()))]
    async fn ask(&self, system: &str, prompt: &str) -> Result<String> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let elapsed_ms = t0.elapsed().as_millis() as u64;
                if e.is_timeout() {
                    error!(elapsed_ms, "AI request timed out");
                    ReportError::ai_service(format!("request timed out after {elapsed_ms} ms"))
                } else {
                    error!(elapsed_ms, error = %e, "AI request failed");
                    ReportError::ai_service(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ReportError::ai_service("timed out while reading response")
            } else {
                ReportError::ai_service(format!("failed to read response: {e}"))
            }
        })?;

        if !status.is_success() {
            error!(
                status = status.as_u16(),
                body = %truncate_for_log(&body, 300),
                "AI service returned an error"
            );
            return Err(ReportError::AiService {
                message: format!("endpoint returned {status}"),
                status: Some(status.as_u16()),
                body: Some(body),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, body = %truncate_for_log(&body, 300), "Unparsable AI response");
            ReportError::AiService {
                message: format!("unexpected response shape: {e}"),
                status: Some(status.as_u16()),
                body: Some(body.clone()),
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ReportError::AiService {
                message: "response contained no generated text".into(),
                status: Some(status.as_u16()),
                body: Some(body.clone()),
            })?;

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            response_chars = content.chars().count(),
            "AI response received"
        );
        Ok(content)
    }
}
