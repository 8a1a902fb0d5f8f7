//! Error types for availability-engine operations.

use thiserror::Error;

use crate::availability::UnifiedAvailability;
use crate::freebusy::FreeInterval;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown meeting type: {0}")]
    UnknownMeetingType(String),

    /// No free interval satisfies the request. Carries the closest interval
    /// that fell short and the availability computed before giving up.
    #[error("No availability: {reason}")]
    NoAvailability {
        reason: String,
        nearest_miss: Option<FreeInterval>,
        availability: Box<UnifiedAvailability>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
