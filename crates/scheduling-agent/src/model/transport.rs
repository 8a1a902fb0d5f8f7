//! The outbound hop to the model service.
//!
//! [`ModelTransport`] is one attempt, no retries. [`HttpTransport`] speaks
//! the OpenAI-compatible chat completions protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelConfig;
use crate::error::ConfigError;

/// Prompt and sampling parameters for one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// What the service returned, before accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model_id: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Network(String),

    #[error("throttled by model service")]
    Throttled,

    #[error("model service unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Network trouble, timeouts, throttling and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network(_) | Self::Throttled | Self::Unavailable { .. }
        )
    }
}

#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Make exactly one attempt.
    async fn complete(&self, request: &ModelRequest) -> Result<RawCompletion, TransportError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    model_id: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl HttpTransport {
    /// Build from configuration, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.endpoint_url(),
            &config.model_id,
            config.api_key(),
            config.request_timeout(),
        )
    }

    pub fn new(
        base_url: &str,
        model_id: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model_id: model_id.to_string(),
            api_key,
        })
    }

    fn classify(status: StatusCode, body: &str) -> TransportError {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|r| r.error.message)
            .unwrap_or_else(|_| body.trim().to_string());

        match status.as_u16() {
            429 => TransportError::Throttled,
            408 => TransportError::Timeout,
            401 | 403 => TransportError::Authentication(message),
            500..=599 => TransportError::Unavailable {
                status: status.as_u16(),
                message,
            },
            _ => TransportError::MalformedRequest(format!("{}: {}", status, message)),
        }
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn complete(&self, request: &ModelRequest) -> Result<RawCompletion, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model_id,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;
        if !status.is_success() {
            return Err(Self::classify(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| TransportError::InvalidResponse(format!("failed to parse response: {}", e)))?;
        let usage = parsed
            .usage
            .ok_or_else(|| TransportError::InvalidResponse("response carries no token usage".to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::InvalidResponse("response has no message content".to_string()))?;

        Ok(RawCompletion {
            content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            model_id: parsed.model.unwrap_or_else(|| self.model_id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            HttpTransport::classify(StatusCode::TOO_MANY_REQUESTS, ""),
            TransportError::Throttled
        );
        assert!(matches!(
            HttpTransport::classify(StatusCode::UNAUTHORIZED, r#"{"error":{"message":"bad key"}}"#),
            TransportError::Authentication(m) if m == "bad key"
        ));
        assert!(matches!(
            HttpTransport::classify(StatusCode::BAD_GATEWAY, "upstream"),
            TransportError::Unavailable { status: 502, .. }
        ));
        assert!(matches!(
            HttpTransport::classify(StatusCode::UNPROCESSABLE_ENTITY, "nope"),
            TransportError::MalformedRequest(_)
        ));
    }

    #[test]
    fn transient_kinds() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Throttled.is_transient());
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(!TransportError::Authentication("x".into()).is_transient());
        assert!(!TransportError::MalformedRequest("x".into()).is_transient());
        assert!(!TransportError::InvalidResponse("x".into()).is_transient());
    }

    #[test]
    fn base_url_is_normalized() {
        let transport =
            HttpTransport::new("http://localhost:1234/v1/", "m", None, Duration::from_secs(1)).unwrap();
        assert!(!transport.base_url.ends_with('/'));
    }
}
