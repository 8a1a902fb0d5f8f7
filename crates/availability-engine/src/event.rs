//! Canonical calendar event, independent of the provider it came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

/// Whether an event blocks time on the owner's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    #[default]
    Busy,
    Free,
}

/// A single concrete event instance with a UTC time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub status: EventStatus,
    /// True when this instance was materialized from a recurrence rule.
    #[serde(default)]
    pub recurrence_expanded: bool,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub transparency: Transparency,
}

impl CalendarEvent {
    /// Build a confirmed, busy event. Fails unless `start < end`.
    pub fn new(
        id: impl Into<String>,
        calendar_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        let id = id.into();
        if start >= end {
            return Err(EngineError::InvalidInterval(format!(
                "event {} ends at or before its start ({} >= {})",
                id, start, end
            )));
        }
        Ok(Self {
            id,
            calendar_id: calendar_id.into(),
            start,
            end,
            status: EventStatus::Confirmed,
            recurrence_expanded: false,
            attendees: Vec::new(),
            transparency: Transparency::Busy,
        })
    }

    /// Whether this event occupies time on the timeline.
    ///
    /// Cancelled and transparent events never do. Tentative events count
    /// only when `count_tentative` is set.
    pub fn blocks_time(&self, count_tentative: bool) -> bool {
        if self.start >= self.end || self.transparency == Transparency::Free {
            return false;
        }
        match self.status {
            EventStatus::Confirmed => true,
            EventStatus::Tentative => count_tentative,
            EventStatus::Cancelled => false,
        }
    }
}
