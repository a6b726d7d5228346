//! Language-model completion client.
//!
//! Speaks the OpenRouter-style `/chat/completions` contract: a JSON payload
//! carrying the model name, the message sequence, and sampling parameters.
//! The response envelope is walked leniently (`choices[0].message.content`)
//! so that a reshuffled provider payload degrades to "no content" instead of
//! a deserialization error.

use async_trait::async_trait;
use deskbot_core::config::LlmConfig;
use deskbot_core::prompt::PromptMessage;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response carried no usable message content")]
    EmptyCompletion,
}

/// The one response-critical external dependency of the pipeline.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError>;
}

/// HTTP client for an OpenRouter-compatible completion endpoint.
pub struct OpenRouterClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OpenRouterClient {
    pub fn new(http: reqwest::Client, config: LlmConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = completion_body(&self.config, messages);

        tracing::debug!(
            event_name = "chat.llm.request",
            model = %self.config.model,
            message_count = messages.len(),
            "sending completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                event_name = "chat.llm.request_failed",
                status = status.as_u16(),
                "completion endpoint rejected the request"
            );
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let raw = response.text().await?;
        match extract_message_content(&raw) {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(LlmError::EmptyCompletion),
        }
    }
}

fn completion_body(config: &LlmConfig, messages: &[PromptMessage]) -> Value {
    json!({
        "model": config.model,
        "messages": messages,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "top_p": config.top_p,
        "presence_penalty": config.presence_penalty,
        "frequency_penalty": config.frequency_penalty,
    })
}

/// Pulls `choices[0].message.content` out of a completion envelope.
///
/// Every missing step is reported and mapped to `None` rather than an error;
/// the caller decides whether an absent completion is fatal.
pub fn extract_message_content(raw: &str) -> Option<String> {
    let envelope: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(
                event_name = "chat.llm.envelope_invalid",
                error = %error,
                "completion response is not valid JSON"
            );
            return None;
        }
    };

    let content = match walk_envelope(&envelope) {
        Ok(content) => content,
        Err(missing) => {
            tracing::warn!(
                event_name = "chat.llm.envelope_shape_mismatch",
                missing,
                "completion envelope lacks the expected field"
            );
            return None;
        }
    };
    Some(content.to_string())
}

fn walk_envelope(envelope: &Value) -> Result<&str, &'static str> {
    let choices = envelope.get("choices").and_then(Value::as_array).ok_or("choices")?;
    let first = choices.first().ok_or("choices[0]")?;
    let message = first.get("message").ok_or("message")?;
    message.get("content").and_then(Value::as_str).ok_or("content")
}
