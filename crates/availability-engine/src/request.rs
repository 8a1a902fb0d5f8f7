//! Scheduling requests and the candidate slots produced for them.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::preferences::{Buffers, MeetingType, Preferences};

/// Hard-constraint switches carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardConstraints {
    /// Only offer slots inside the requester's working hours.
    pub within_working_hours: bool,
    /// Let a VIP participant relax `within_working_hours`.
    pub allow_vip_override: bool,
}

impl Default for HardConstraints {
    fn default() -> Self {
        Self {
            within_working_hours: true,
            allow_vip_override: true,
        }
    }
}

/// A request for meeting slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingRequest {
    pub requester_id: String,
    #[serde(default)]
    pub participants: BTreeSet<String>,
    /// Desired duration. Falls back to the meeting type's default.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
    #[serde(default)]
    pub meeting_type: Option<String>,
    #[serde(default)]
    pub constraints: HardConstraints,
}

impl SchedulingRequest {
    /// Validate bounds against `preferences` and resolve the meeting
    /// duration.
    pub fn validate(&self, preferences: &Preferences) -> Result<Duration> {
        if self.earliest >= self.latest {
            return Err(EngineError::InvalidRequest(format!(
                "earliest bound {} is not before latest bound {}",
                self.earliest, self.latest
            )));
        }
        let duration = self.duration(preferences)?;
        if duration <= Duration::zero() {
            return Err(EngineError::InvalidRequest(
                "meeting duration must be positive".to_string(),
            ));
        }
        if self.latest - self.earliest < duration {
            return Err(EngineError::InvalidRequest(format!(
                "requested window is shorter than the {} minute meeting",
                duration.num_minutes()
            )));
        }
        Ok(duration)
    }

    pub fn meeting_type<'p>(&self, preferences: &'p Preferences) -> Result<Option<&'p MeetingType>> {
        self.meeting_type
            .as_deref()
            .map(|name| preferences.meeting_type(name))
            .transpose()
    }

    pub fn duration(&self, preferences: &Preferences) -> Result<Duration> {
        let minutes = match (self.duration_minutes, self.meeting_type(preferences)?) {
            (Some(m), _) => m,
            (None, Some(mt)) => mt.default_duration_minutes,
            (None, None) => {
                return Err(EngineError::InvalidRequest(
                    "no duration given and no meeting type to take one from".to_string(),
                ))
            }
        };
        Ok(Duration::minutes(minutes as i64))
    }

    pub fn buffers(&self, preferences: &Preferences) -> Result<Buffers> {
        Ok(self
            .meeting_type(preferences)?
            .map(MeetingType::buffers)
            .unwrap_or_else(Buffers::none))
    }

    /// A VIP participant relaxes the working-hours constraint.
    pub fn vip_override(&self, preferences: &Preferences) -> bool {
        self.constraints.allow_vip_override && preferences.has_vip(&self.participants)
    }

    /// Whether free intervals must be confined to working hours.
    pub fn enforces_working_hours(&self, preferences: &Preferences) -> bool {
        self.constraints.within_working_hours && !self.vip_override(preferences)
    }
}

/// A soft constraint a candidate slot breaks. Annotated, never excluding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Violation {
    /// Outside working hours with no VIP to justify it.
    OutsideWorkingHours,
    /// Outside working hours, allowed because a VIP participates.
    VipOverride,
    /// Starts or ends flush against another meeting with no buffer.
    BackToBack,
    /// The meeting type is not allowed on this weekday.
    DisallowedDay { weekday: Weekday },
}

/// A proposed meeting slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub score: f64,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}
