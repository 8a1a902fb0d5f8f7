//! Scheduler configuration.
//!
//! One [`SchedulerConfig`] is built at startup: defaults, then an optional
//! TOML file, then `SCHEDULER_*` environment entries. It is validated once
//! and shared read-only behind an `Arc`.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use availability_engine::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SCHEDULER_";

/// Largest accepted per-attempt timeout (10 minutes).
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// Largest accepted retry backoff (5 minutes).
pub const MAX_BACKOFF_MS: u64 = 300_000;

/// Model service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// When false the pipeline returns score order without calling the model.
    pub enabled: bool,
    pub region: String,
    /// Base URL of an OpenAI-compatible endpoint. `{region}` is substituted.
    pub endpoint: String,
    pub model_id: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Total attempts per call, including the first.
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            region: "us-east-1".to_string(),
            endpoint: "https://bedrock-runtime.{region}.amazonaws.com/openai/v1".to_string(),
            model_id: "openai.gpt-oss-120b-1:0".to_string(),
            api_key_env: "SCHEDULER_MODEL_API_KEY".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            top_p: 0.9,
            max_retries: 3,
            timeout_ms: 30_000,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            input_cost_per_1k: 0.0008,
            output_cost_per_1k: 0.0032,
        }
    }
}

impl ModelConfig {
    /// The endpoint with the region filled in, without a trailing slash.
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .replace("{region}", &self.region)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `retry` (1-based): the initial backoff
    /// doubled per retry, capped at `max_backoff_ms`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// The API key, read from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let region_ok = !self.region.is_empty()
            && self
                .region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(ConfigError::Invalid(format!(
                "model.region '{}' is not a region name",
                self.region
            )));
        }
        let url = self.endpoint_url();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "model.endpoint '{}' must be an http(s) URL",
                url
            )));
        }
        if self.model_id.trim().is_empty() {
            return Err(ConfigError::Invalid("model.model_id must not be empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("model.max_tokens must be > 0".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "model.temperature must be within 0..=2 (got {})",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "model.top_p must be within (0, 1] (got {})",
                self.top_p
            )));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "model.max_retries counts total attempts and must be >= 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 || self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "model.timeout_ms must be between 1 and {}",
                MAX_TIMEOUT_MS
            )));
        }
        if self.initial_backoff_ms == 0 {
            return Err(ConfigError::Invalid("model.initial_backoff_ms must be > 0".to_string()));
        }
        if self.max_backoff_ms > MAX_BACKOFF_MS {
            return Err(ConfigError::Invalid(format!(
                "model.max_backoff_ms must be at most {}",
                MAX_BACKOFF_MS
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "model.initial_backoff_ms must not exceed model.max_backoff_ms".to_string(),
            ));
        }
        for (name, cost) in [
            ("model.input_cost_per_1k", self.input_cost_per_1k),
            ("model.output_cost_per_1k", self.output_cost_per_1k),
        ] {
            if !cost.is_finite() || cost < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a finite, non-negative number (got {})",
                    name, cost
                )));
            }
        }
        Ok(())
    }
}

/// Everything the scheduler needs, engine and model together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub engine: EngineConfig,
    pub model: ModelConfig,
}

impl SchedulerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overlaid with `path` if given, overlaid with the process
    /// environment, then validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading scheduler config");
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => SchedulerConfig::default(),
        };
        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SCHEDULER_*` entries. Other keys are ignored.
    ///
    /// | key | field |
    /// |---|---|
    /// | `SCHEDULER_MODEL_ENABLED` | `model.enabled` |
    /// | `SCHEDULER_MODEL_REGION` | `model.region` |
    /// | `SCHEDULER_MODEL_ENDPOINT` | `model.endpoint` |
    /// | `SCHEDULER_MODEL_ID` | `model.model_id` |
    /// | `SCHEDULER_MODEL_MAX_TOKENS` | `model.max_tokens` |
    /// | `SCHEDULER_MODEL_TEMPERATURE` | `model.temperature` |
    /// | `SCHEDULER_MODEL_TOP_P` | `model.top_p` |
    /// | `SCHEDULER_MODEL_MAX_RETRIES` | `model.max_retries` |
    /// | `SCHEDULER_MODEL_TIMEOUT_MS` | `model.timeout_ms` |
    /// | `SCHEDULER_MODEL_INPUT_COST_PER_1K` | `model.input_cost_per_1k` |
    /// | `SCHEDULER_MODEL_OUTPUT_COST_PER_1K` | `model.output_cost_per_1k` |
    /// | `SCHEDULER_TOP_N` | `engine.top_n` |
    /// | `SCHEDULER_MAX_REPLACEMENTS` | `engine.max_replacements` |
    /// | `SCHEDULER_LOOK_AROUND_DAYS` | `engine.look_around_days` |
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "MODEL_ENABLED" => self.model.enabled = parse_value(key, value)?,
                "MODEL_REGION" => self.model.region = value.to_string(),
                "MODEL_ENDPOINT" => self.model.endpoint = value.to_string(),
                "MODEL_ID" => self.model.model_id = value.to_string(),
                "MODEL_MAX_TOKENS" => self.model.max_tokens = parse_value(key, value)?,
                "MODEL_TEMPERATURE" => self.model.temperature = parse_value(key, value)?,
                "MODEL_TOP_P" => self.model.top_p = parse_value(key, value)?,
                "MODEL_MAX_RETRIES" => self.model.max_retries = parse_value(key, value)?,
                "MODEL_TIMEOUT_MS" => self.model.timeout_ms = parse_value(key, value)?,
                "MODEL_INPUT_COST_PER_1K" => self.model.input_cost_per_1k = parse_value(key, value)?,
                "MODEL_OUTPUT_COST_PER_1K" => self.model.output_cost_per_1k = parse_value(key, value)?,
                "TOP_N" => self.engine.top_n = parse_value(key, value)?,
                "MAX_REPLACEMENTS" => self.engine.max_replacements = parse_value(key, value)?,
                "LOOK_AROUND_DAYS" => self.engine.look_around_days = parse_value(key, value)?,
                _ => continue,
            }
            tracing::debug!(key, "applied configuration override");
        }
        Ok(())
    }

    /// Fail fast on values no request could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.model.validate()
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Override {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SchedulerConfig::default().validate().unwrap();
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let model = ModelConfig::default();
        assert_eq!(model.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(model.backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(model.backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(model.backoff_delay(10), Duration::from_millis(8000));
        assert_eq!(model.backoff_delay(200), Duration::from_millis(8000));
    }

    #[test]
    fn endpoint_substitutes_region() {
        let model = ModelConfig {
            region: "eu-west-1".to_string(),
            ..ModelConfig::default()
        };
        assert_eq!(
            model.endpoint_url(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com/openai/v1"
        );
    }
}
