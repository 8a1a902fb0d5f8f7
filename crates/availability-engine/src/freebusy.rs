//! Busy/free interval primitives.
//!
//! Sorts busy intervals by start time, sweep-merges overlapping or touching
//! periods, then carves free intervals out of a working-hours mask.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::preferences::{Blackout, MaskWindow};

/// The calendar event a busy interval was derived from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusySource {
    pub calendar_id: String,
    pub event_id: String,
}

/// A busy period on the unified timeline.
///
/// Before merging an interval carries exactly one source. After merging it
/// carries every contributing source, sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sources: Vec<BusySource>,
}

impl BusyInterval {
    /// The first contributing calendar, used as the merge tiebreaker.
    pub fn calendar_id(&self) -> Option<&str> {
        self.sources.first().map(|s| s.calendar_id.as_str())
    }

    /// Half-open overlap test. Touching ranges do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// A free period inside one working window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    /// The interval starts exactly where a busy interval ends.
    #[serde(default)]
    pub follows_busy: bool,
    /// The interval ends exactly where a busy interval starts.
    #[serde(default)]
    pub precedes_busy: bool,
}

impl FreeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            duration_minutes: (end - start).num_minutes(),
            follows_busy: false,
            precedes_busy: false,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && end <= self.end
    }
}

/// Sweep-merge busy intervals into a minimal, sorted, non-overlapping set.
///
/// Intervals are ordered by start, ties broken by calendar id and then end,
/// so the output is deterministic regardless of input order. Touching
/// intervals (`a.end == b.start`) are merged. Empty or inverted intervals are
/// dropped.
pub fn merge_busy_intervals(mut intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    intervals.retain(|i| i.start < i.end);
    intervals.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.calendar_id().cmp(&b.calendar_id()))
            .then_with(|| a.end.cmp(&b.end))
    });

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        if let Some(last) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                last.sources.extend(interval.sources);
                continue;
            }
        }
        merged.push(interval);
    }

    for interval in &mut merged {
        interval.sources.sort();
        interval.sources.dedup();
    }
    merged
}

/// Merge overlapping or touching mask windows and sort them.
pub(crate) fn merge_mask(mut mask: Vec<MaskWindow>) -> Vec<MaskWindow> {
    mask.retain(|w| w.start < w.end);
    mask.sort_by_key(|w| (w.start, w.end));
    let mut merged: Vec<MaskWindow> = Vec::with_capacity(mask.len());
    for window in mask {
        if let Some(last) = merged.last_mut() {
            if window.start <= last.end {
                last.end = last.end.max(window.end);
                continue;
            }
        }
        merged.push(window);
    }
    merged
}

/// Sort mask windows and merge the ones that overlap. Windows that only
/// touch stay separate so per-day windows keep their boundaries.
fn merge_overlapping(mask: &[MaskWindow]) -> Vec<MaskWindow> {
    let mut windows: Vec<MaskWindow> = mask.iter().filter(|w| w.start < w.end).copied().collect();
    windows.sort_by_key(|w| (w.start, w.end));
    let mut merged: Vec<MaskWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        if let Some(last) = merged.last_mut() {
            if window.start < last.end {
                last.end = last.end.max(window.end);
                continue;
            }
        }
        merged.push(window);
    }
    merged
}

/// Subtract busy intervals and blackouts from every mask window.
///
/// Returns free intervals sorted by start. Zero-length gaps are discarded.
/// The result never overlaps a busy interval or a blackout.
pub fn free_intervals(
    busy: &[BusyInterval],
    mask: &[MaskWindow],
    blackouts: &[Blackout],
) -> Vec<FreeInterval> {
    // (start, end, is_busy); blackouts block time but are not busy time.
    let mut blocked: Vec<(DateTime<Utc>, DateTime<Utc>, bool)> = busy
        .iter()
        .map(|b| (b.start, b.end, true))
        .chain(blackouts.iter().map(|b| (b.start, b.end, false)))
        .filter(|(start, end, _)| start < end)
        .collect();
    blocked.sort_by_key(|&(start, end, _)| (start, end));

    let mut free = Vec::new();
    for window in merge_overlapping(mask) {
        let relevant: Vec<_> = blocked
            .iter()
            .filter(|(start, end, _)| *start < window.end && *end > window.start)
            .collect();
        let mut cursor = window.start;
        let mut follows_busy = false;

        for (i, &&(start, end, is_busy)) in relevant.iter().enumerate() {
            if start > cursor {
                let precedes_busy = relevant[i..]
                    .iter()
                    .take_while(|entry| entry.0 == start)
                    .any(|entry| entry.2);
                free.push(FreeInterval {
                    precedes_busy,
                    follows_busy,
                    ..FreeInterval::new(cursor, start)
                });
            }
            if end > cursor {
                cursor = end;
                follows_busy = is_busy;
            } else if end == cursor {
                follows_busy |= is_busy;
            }
        }

        if cursor < window.end {
            free.push(FreeInterval {
                follows_busy,
                ..FreeInterval::new(cursor, window.end)
            });
        }
    }

    free.sort_by_key(|f| f.start);
    free
}
