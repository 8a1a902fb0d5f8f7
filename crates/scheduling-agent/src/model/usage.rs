//! Token usage and cost accounting for a single model call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// Token counts and derived cost of one call. Produced once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    /// In the currency of the configured per-1K prices.
    pub estimated_cost: f64,
    pub model_id: String,
    /// Wall time of the successful attempt.
    pub latency_ms: u64,
}

impl TokenUsage {
    /// Account a call from the provider's token counts.
    pub fn new(
        input_tokens: u32,
        output_tokens: u32,
        model_id: impl Into<String>,
        latency: Duration,
        pricing: &ModelConfig,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            estimated_cost: estimate_cost(
                input_tokens,
                output_tokens,
                pricing.input_cost_per_1k,
                pricing.output_cost_per_1k,
            ),
            model_id: model_id.into(),
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// `input/1000 * in_per_1k + output/1000 * out_per_1k`.
pub fn estimate_cost(input_tokens: u32, output_tokens: u32, input_per_1k: f64, output_per_1k: f64) -> f64 {
    f64::from(input_tokens) / 1000.0 * input_per_1k + f64::from(output_tokens) / 1000.0 * output_per_1k
}
