//! Error types for the scheduling agent.

use availability_engine::{EngineError, FreeInterval, UnifiedAvailability};
use serde::Serialize;
use thiserror::Error;

use crate::model::TransportError;

/// A request-level failure. Source-local problems (one calendar failing,
/// one malformed record, the model being down) never surface here; they
/// become warnings on the response.
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Preferences not found for user {0}")]
    PreferencesNotFound(String),

    /// Nothing fits the request. Carries the closest interval that fell
    /// short and the work done before giving up.
    #[error("No availability: {reason}")]
    NoAvailability {
        reason: String,
        nearest_miss: Option<FreeInterval>,
        partial: Box<PartialComputation>,
    },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// What the pipeline had computed when it gave up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialComputation {
    pub availability: UnifiedAvailability,
    pub warnings: Vec<String>,
    pub skipped_records: usize,
}

/// The model call could not produce an answer.
#[derive(Error, Debug)]
pub enum ModelServiceError {
    #[error("Model call failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },

    #[error("Model call failed without retry: {0}")]
    NonTransient(TransportError),

    #[error("Model call deadline reached after {attempts} attempts")]
    DeadlineExceeded {
        attempts: u32,
        last: Option<TransportError>,
    },
}

impl ModelServiceError {
    /// Attempts made before the failure was returned.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::DeadlineExceeded { attempts, .. } => *attempts,
            Self::NonTransient(_) => 1,
        }
    }
}

/// One calendar could not be fetched.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("calendar {calendar_id}: {reason}")]
pub struct CalendarFetchError {
    pub calendar_id: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Override {
        key: String,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, SchedulingError>;
