//! Point-in-time conflict detection for a proposed meeting.
//!
//! Checks run in priority order and only the first match is reported:
//!
//! 1. direct overlap with busy time → [`ConflictKind::HardOverlap`]
//! 2. overlap with a busy interval once buffers are added →
//!    [`ConflictKind::BufferViolation`]
//! 3. overlap with a blackout → [`ConflictKind::Blackout`]
//! 4. outside working hours without a VIP override →
//!    [`ConflictKind::OutsideWorkingHours`]
//!
//! Adjacent intervals (one ends exactly when the other starts) never overlap.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::freebusy::{free_intervals, BusyInterval};
use crate::preferences::{Blackout, Buffers, Preferences};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    HardOverlap,
    BufferViolation,
    Blackout,
    OutsideWorkingHours,
}

/// A meeting someone wants to place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub meeting_type: Option<String>,
    #[serde(default)]
    pub participants: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub within_working_hours: bool,
    #[serde(default = "default_true")]
    pub allow_vip_override: bool,
}

fn default_true() -> bool {
    true
}

impl ProposedSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            meeting_type: None,
            participants: BTreeSet::new(),
            within_working_hours: true,
            allow_vip_override: true,
        }
    }

    fn buffers(&self, preferences: &Preferences) -> Result<Buffers> {
        match &self.meeting_type {
            Some(name) => Ok(preferences.meeting_type(name)?.buffers()),
            None => Ok(Buffers::none()),
        }
    }

    fn vip_override(&self, preferences: &Preferences) -> bool {
        self.allow_vip_override && preferences.has_vip(&self.participants)
    }
}

/// Where the meeting could go instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    /// Signed offset from the proposed start, in minutes.
    pub shift_minutes: i64,
    pub alternate_start: DateTime<Utc>,
    pub alternate_end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub kind: ConflictKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Busy intervals involved (empty for blackout and working-hours kinds).
    pub conflicting: Vec<BusyInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blackout: Option<Blackout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
}

/// Classify the first conflict of `proposed` against `busy` and
/// `preferences`, or `None` if it is clean.
///
/// `busy` should cover the look-around window (`config.look_around_days`
/// either side) for the remediation to be trustworthy; time outside the
/// supplied busy data is assumed free.
pub fn detect_conflicts(
    proposed: &ProposedSlot,
    busy: &[BusyInterval],
    preferences: &Preferences,
    config: &EngineConfig,
) -> Result<Option<ConflictReport>> {
    if proposed.start >= proposed.end {
        return Err(EngineError::InvalidInterval(format!(
            "proposed slot ends at or before its start ({} >= {})",
            proposed.start, proposed.end
        )));
    }
    let buffers = proposed.buffers(preferences)?;
    let check_hours = proposed.within_working_hours && !proposed.vip_override(preferences);

    let overlapping: Vec<BusyInterval> = busy
        .iter()
        .filter(|b| b.overlaps(proposed.start, proposed.end))
        .cloned()
        .collect();

    let (kind, conflicting, blackout) = if !overlapping.is_empty() {
        (ConflictKind::HardOverlap, overlapping, None)
    } else {
        let padded_start = proposed.start - buffers.before;
        let padded_end = proposed.end + buffers.after;
        let in_buffer: Vec<BusyInterval> = busy
            .iter()
            .filter(|b| b.overlaps(padded_start, padded_end))
            .cloned()
            .collect();

        if !in_buffer.is_empty() {
            (ConflictKind::BufferViolation, in_buffer, None)
        } else if let Some(b) = preferences.blackout_overlapping(proposed.start, proposed.end) {
            (ConflictKind::Blackout, Vec::new(), Some(b.clone()))
        } else if check_hours
            && !preferences.within_working_hours(proposed.start, proposed.end, config.dst_policy)?
        {
            (ConflictKind::OutsideWorkingHours, Vec::new(), None)
        } else {
            return Ok(None);
        }
    };

    let remediation = find_remediation(proposed, buffers, check_hours, busy, preferences, config)?;

    Ok(Some(ConflictReport {
        kind,
        start: proposed.start,
        end: proposed.end,
        conflicting,
        blackout,
        remediation,
    }))
}

/// Nearest placement of the same length (plus buffers) within the
/// look-around window. Ties go to the earlier alternative.
fn find_remediation(
    proposed: &ProposedSlot,
    buffers: Buffers,
    check_hours: bool,
    busy: &[BusyInterval],
    preferences: &Preferences,
    config: &EngineConfig,
) -> Result<Option<Remediation>> {
    let duration = proposed.end - proposed.start;
    let (search_start, search_end) = config.look_around(proposed.start, proposed.end)?;

    let mask = if check_hours {
        preferences.working_mask(search_start, search_end, config.dst_policy)?
    } else {
        preferences.day_mask(search_start, search_end, config.dst_policy)?
    };
    let free = free_intervals(busy, &mask, &preferences.blackouts);

    let best = free
        .iter()
        .filter(|f| f.duration() >= duration + buffers.total())
        .map(|f| {
            let lo = f.start + buffers.before;
            let hi = f.end - buffers.after - duration;
            proposed.start.clamp(lo, hi)
        })
        .filter(|start| *start != proposed.start)
        .min_by_key(|start| ((*start - proposed.start).num_seconds().abs(), *start));

    Ok(best.map(|alternate_start| Remediation {
        shift_minutes: (alternate_start - proposed.start).num_minutes(),
        alternate_start,
        alternate_end: alternate_start + duration,
    }))
}
