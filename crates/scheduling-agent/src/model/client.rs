//! Retrying model client.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::transport::{ModelRequest, ModelTransport, TransportError};
use super::usage::TokenUsage;
use crate::config::SchedulerConfig;
use crate::error::ModelServiceError;

/// A successful model call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model_id: String,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Delays slept between attempts, in order.
    #[serde(skip)]
    pub backoff: Vec<Duration>,
}

/// Wraps a [`ModelTransport`] with per-attempt timeouts, bounded retries
/// and exponential backoff. Responses are never cached.
#[derive(Clone)]
pub struct ModelClient {
    transport: Arc<dyn ModelTransport>,
    config: Arc<SchedulerConfig>,
}

impl ModelClient {
    pub fn new(transport: Arc<dyn ModelTransport>, config: Arc<SchedulerConfig>) -> Self {
        Self { transport, config }
    }

    /// A request using the configured sampling parameters.
    pub fn request(&self, prompt: impl Into<String>) -> ModelRequest {
        let model = &self.config.model;
        ModelRequest {
            prompt: prompt.into(),
            max_tokens: model.max_tokens,
            temperature: model.temperature,
            top_p: model.top_p,
        }
    }

    pub async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
        top_p: f32,
    ) -> Result<ModelResponse, ModelServiceError> {
        let request = ModelRequest {
            prompt: prompt.to_string(),
            max_tokens,
            temperature,
            top_p,
        };
        self.invoke_until(&request, None).await
    }

    /// Call the model, retrying transient failures.
    ///
    /// At most `model.max_retries` attempts are made in total. Each attempt
    /// is bounded by `model.timeout_ms` (and by the time left before
    /// `deadline`); an attempt that runs out of time counts as a transient
    /// timeout. Retry `n` waits `initial_backoff * 2^(n-1)`, capped at
    /// `max_backoff`. A backoff that would end past `deadline` is not
    /// started.
    pub async fn invoke_until(
        &self,
        request: &ModelRequest,
        deadline: Option<Instant>,
    ) -> Result<ModelResponse, ModelServiceError> {
        let model = &self.config.model;
        let max_attempts = model.max_retries.max(1);
        let mut backoff = Vec::new();
        let mut last: Option<TransportError> = None;
        let mut attempt = 0;

        loop {
            let mut limit = model.request_timeout();
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(ModelServiceError::DeadlineExceeded {
                        attempts: attempt,
                        last,
                    });
                }
                limit = limit.min(remaining);
            }
            attempt += 1;

            let started = Instant::now();
            let outcome = match tokio::time::timeout(limit, self.transport.complete(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout),
            };

            let error = match outcome {
                Ok(raw) => {
                    let usage = TokenUsage::new(
                        raw.input_tokens,
                        raw.output_tokens,
                        raw.model_id.clone(),
                        started.elapsed(),
                        model,
                    );
                    tracing::debug!(
                        attempt,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        latency_ms = usage.latency_ms,
                        "model call succeeded"
                    );
                    return Ok(ModelResponse {
                        content: raw.content,
                        usage,
                        model_id: raw.model_id,
                        attempts: attempt,
                        backoff,
                    });
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                tracing::warn!(attempt, error = %error, "model call failed, not retrying");
                return Err(ModelServiceError::NonTransient(error));
            }
            if attempt >= max_attempts {
                tracing::warn!(attempt, error = %error, "model call failed, retries exhausted");
                return Err(ModelServiceError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = model.backoff_delay(attempt);
            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                tracing::warn!(attempt, error = %error, "model call failed, no time left to retry");
                return Err(ModelServiceError::DeadlineExceeded {
                    attempts: attempt,
                    last: Some(error),
                });
            }

            tracing::warn!(
                attempt,
                max_retries = max_attempts,
                delay_ms = delay.as_millis() as u64,
                "model call failed, retrying: {}",
                error
            );
            tokio::time::sleep(delay).await;
            backoff.push(delay);
            last = Some(error);
        }
    }
}
