//! Engine tuning knobs.
//!
//! Built once at startup, validated, then shared read-only. Every field has
//! a default so a partial TOML table deserializes cleanly.

/// Largest accepted `look_around_days`.
pub const MAX_LOOK_AROUND_DAYS: u32 = 366;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::error::{EngineError, Result};

/// Weights for the candidate score. Positive terms reward, penalties subtract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Closeness of the slot start to the preferred time of day.
    pub time_of_day: f64,
    /// Spare room beyond the required buffers (capped at 30 minutes).
    pub buffer_slack: f64,
    pub outside_hours_penalty: f64,
    pub back_to_back_penalty: f64,
    pub disallowed_day_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            time_of_day: 1.0,
            buffer_slack: 0.5,
            outside_hours_penalty: 0.75,
            back_to_back_penalty: 0.25,
            disallowed_day_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringWeights,
    /// Preferred local meeting start (mid-morning by default).
    pub preferred_time_of_day: NaiveTime,
    /// Slot starts snap to this grid when the free interval allows it.
    pub slot_granularity_minutes: u32,
    pub top_n: usize,
    /// How many conflicting candidates the recommender replaces before
    /// giving up.
    pub max_replacements: usize,
    /// Remediation search radius around a conflicting slot.
    pub look_around_days: u32,
    /// Upper bound on instances materialized per recurring event.
    pub max_recurrence_instances: u16,
    pub dst_policy: DstPolicy,
    pub count_tentative_as_busy: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringWeights::default(),
            preferred_time_of_day: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_granularity_minutes: 15,
            top_n: 5,
            max_replacements: 3,
            look_around_days: 7,
            max_recurrence_instances: 500,
            dst_policy: DstPolicy::default(),
            count_tentative_as_busy: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("scoring.time_of_day", self.scoring.time_of_day),
            ("scoring.buffer_slack", self.scoring.buffer_slack),
            ("scoring.outside_hours_penalty", self.scoring.outside_hours_penalty),
            ("scoring.back_to_back_penalty", self.scoring.back_to_back_penalty),
            ("scoring.disallowed_day_penalty", self.scoring.disallowed_day_penalty),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::Configuration(format!(
                    "{} must be a finite, non-negative number (got {})",
                    name, value
                )));
            }
        }
        if self.slot_granularity_minutes == 0 || self.slot_granularity_minutes > 24 * 60 {
            return Err(EngineError::Configuration(
                "slot_granularity_minutes must be between 1 and 1440".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(EngineError::Configuration("top_n must be > 0".to_string()));
        }
        if self.max_recurrence_instances == 0 {
            return Err(EngineError::Configuration(
                "max_recurrence_instances must be > 0".to_string(),
            ));
        }
        if self.look_around_days > MAX_LOOK_AROUND_DAYS {
            return Err(EngineError::Configuration(format!(
                "look_around_days must be at most {}",
                MAX_LOOK_AROUND_DAYS
            )));
        }
        Ok(())
    }

    /// `[start, end)` widened by `look_around_days` on both sides.
    ///
    /// # Errors
    /// `EngineError::InvalidRequest` when the widened bounds leave the
    /// representable date range.
    pub fn look_around(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let radius = Duration::days(i64::from(self.look_around_days));
        match (start.checked_sub_signed(radius), end.checked_add_signed(radius)) {
            (Some(lo), Some(hi)) => Ok((lo, hi)),
            _ => Err(EngineError::InvalidRequest(format!(
                "window {} to {} widened by {} days is out of range",
                start, end, self.look_around_days
            ))),
        }
    }
}
