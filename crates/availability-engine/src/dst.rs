//! DST transition policies for local wall-clock boundaries.
//!
//! Working hours, all-day events and naive provider timestamps are all
//! expressed in local time. Twice a year some of those local times either do
//! not exist (spring forward) or exist twice (fall back).

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for local times that fall into a DST gap.
///
/// Ambiguous local times (the repeated hour in autumn) always resolve to the
/// earlier instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Drop the boundary entirely (e.g. a 02:30 working window start on
    /// spring-forward day yields no window for that day).
    Skip,
    /// Move to the first valid local time after the gap.
    #[default]
    ShiftForward,
}

impl DstPolicy {
    /// Resolve a local wall-clock time in `tz` to a UTC instant.
    pub fn resolve(self, tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        if let Some(dt) = tz.from_local_datetime(&local).earliest() {
            return Some(dt.with_timezone(&Utc));
        }
        match self {
            DstPolicy::Skip => None,
            // Gaps are at most two hours in practice; probe in 15 minute steps.
            DstPolicy::ShiftForward => (1..=8).find_map(|step| {
                tz.from_local_datetime(&(local + Duration::minutes(15 * step)))
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }),
        }
    }
}
