//! Multi-calendar availability aggregation.
//!
//! Accepts N event streams (one per connected calendar), merges them into a
//! single busy timeline within a window, then derives free intervals against
//! the user's working-hours mask and blackouts.
//!
//! This is the single source of truth for a user's availability across all
//! their calendars.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::event::CalendarEvent;
use crate::freebusy::{self, BusyInterval, FreeInterval};
use crate::preferences::{daily_windows, Preferences};

/// Unified availability after merging every calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAvailability {
    /// Merged busy intervals (sorted by start, non-overlapping).
    pub busy: Vec<BusyInterval>,
    /// Free intervals inside the mask (sorted by start).
    pub free: Vec<FreeInterval>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Merge busy time from every calendar into one ordered timeline.
///
/// Events that do not block time (cancelled, transparent, tentative when
/// `count_tentative_as_busy` is off) are ignored. The rest are clipped to
/// `[window_start, window_end)`, sorted by start (ties by calendar id) and
/// sweep-merged; touching intervals merge. Each merged interval keeps the
/// `(calendar id, event id)` of every contributing event.
///
/// The map key is authoritative for the source calendar id.
pub fn aggregate(
    events_by_calendar: &BTreeMap<String, Vec<CalendarEvent>>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    config: &EngineConfig,
) -> Vec<BusyInterval> {
    if window_start >= window_end {
        return Vec::new();
    }

    let intervals: Vec<BusyInterval> = events_by_calendar
        .iter()
        .flat_map(|(calendar_id, events)| {
            events
                .iter()
                .filter(|e| e.blocks_time(config.count_tentative_as_busy))
                .filter(|e| e.start < window_end && e.end > window_start)
                .map(move |e| BusyInterval {
                    start: e.start.max(window_start),
                    end: e.end.min(window_end),
                    sources: vec![freebusy::BusySource {
                        calendar_id: calendar_id.clone(),
                        event_id: e.id.clone(),
                    }],
                })
        })
        .collect();

    freebusy::merge_busy_intervals(intervals)
}

/// Re-merge an existing busy timeline, clipped to a window.
///
/// Running this over [`aggregate`] output returns it unchanged.
pub fn reaggregate(
    busy: &[BusyInterval],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<BusyInterval> {
    let clipped = busy
        .iter()
        .filter(|b| b.start < window_end && b.end > window_start)
        .map(|b| BusyInterval {
            start: b.start.max(window_start),
            end: b.end.min(window_end),
            sources: b.sources.clone(),
        })
        .collect();
    freebusy::merge_busy_intervals(clipped)
}

/// Aggregate every calendar and derive free intervals.
///
/// With `preferences`, free time is limited to working hours and excludes
/// blackouts. Without, every UTC day of the window is one mask window.
pub fn compute_availability(
    events_by_calendar: &BTreeMap<String, Vec<CalendarEvent>>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    preferences: Option<&Preferences>,
    config: &EngineConfig,
) -> Result<UnifiedAvailability> {
    let busy = aggregate(events_by_calendar, window_start, window_end, config);
    let (mask, blackouts) = match preferences {
        Some(prefs) => (
            prefs.working_mask(window_start, window_end, config.dst_policy)?,
            prefs.blackouts.as_slice(),
        ),
        None => (
            daily_windows(window_start, window_end, &Tz::UTC, config.dst_policy),
            &[][..],
        ),
    };
    let free = freebusy::free_intervals(&busy, &mask, blackouts);

    Ok(UnifiedAvailability {
        busy,
        free,
        window_start,
        window_end,
    })
}
