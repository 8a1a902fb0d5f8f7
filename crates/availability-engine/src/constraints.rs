//! Preference-driven filtering and scoring of free intervals.
//!
//! Every free interval that can hold the meeting plus its buffers yields one
//! placement: the start closest to the preferred time of day, snapped to the
//! slot grid when the interval allows it. Placements are scored as a
//! weighted sum (see [`ScoringWeights`](crate::config::ScoringWeights)) and
//! annotated with soft violations.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::freebusy::FreeInterval;
use crate::preferences::{Buffers, Preferences};
use crate::request::{CandidateSlot, SchedulingRequest, Violation};

const MINUTES_PER_HALF_DAY: f64 = 720.0;
const BUFFER_SLACK_CAP_MINUTES: f64 = 30.0;

/// A free interval that can hold the meeting, with its chosen placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredInterval {
    pub interval: FreeInterval,
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    pub score: f64,
    pub violations: Vec<Violation>,
}

impl ScoredInterval {
    pub fn to_candidate(&self) -> CandidateSlot {
        CandidateSlot {
            start: self.slot_start,
            end: self.slot_end,
            score: self.score,
            violations: self.violations.clone(),
            rationale: None,
        }
    }
}

/// Score descending, then earliest start.
pub fn rank_order(a: &ScoredInterval, b: &ScoredInterval) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.slot_start.cmp(&b.slot_start))
}

/// Drop intervals that cannot hold the meeting, score the rest.
///
/// Hard exclusions: shorter than duration + buffers, or fully inside a
/// blackout. Soft violations: outside working hours (annotated as a VIP
/// override when one applies), back-to-back with zero buffer, disallowed
/// weekday for the meeting type. Output is in rank order.
pub fn filter_and_score(
    free: &[FreeInterval],
    preferences: &Preferences,
    request: &SchedulingRequest,
    config: &EngineConfig,
) -> Result<Vec<ScoredInterval>> {
    let duration = request.validate(preferences)?;
    let buffers = request.buffers(preferences)?;
    let meeting_type = request.meeting_type(preferences)?;
    let vip_override = request.vip_override(preferences);
    let tz = preferences.tz()?;
    let weights = &config.scoring;

    let mut scored = Vec::new();
    for interval in free {
        if interval.duration() < duration + buffers.total() {
            tracing::trace!(start = %interval.start, "interval too short for meeting and buffers");
            continue;
        }
        if preferences.blackouts.iter().any(|b| b.covers(interval.start, interval.end)) {
            continue;
        }

        let slot_start = place(interval, duration, buffers, &tz, config);
        let slot_end = slot_start + duration;

        let mut violations = Vec::new();
        let mut score = weights.time_of_day * proximity(slot_start, &tz, config)
            + weights.buffer_slack * slack(interval, slot_start, slot_end, buffers);

        if !preferences.within_working_hours(slot_start, slot_end, config.dst_policy)? {
            violations.push(if vip_override {
                Violation::VipOverride
            } else {
                Violation::OutsideWorkingHours
            });
            score -= weights.outside_hours_penalty;
        }

        let flush_before = buffers.before.is_zero() && slot_start == interval.start && interval.follows_busy;
        let flush_after = buffers.after.is_zero() && slot_end == interval.end && interval.precedes_busy;
        if flush_before || flush_after {
            violations.push(Violation::BackToBack);
            score -= weights.back_to_back_penalty;
        }

        let weekday = slot_start.with_timezone(&tz).weekday();
        if meeting_type.is_some_and(|mt| !mt.allows(weekday)) {
            violations.push(Violation::DisallowedDay { weekday });
            score -= weights.disallowed_day_penalty;
        }

        scored.push(ScoredInterval {
            interval: interval.clone(),
            slot_start,
            slot_end,
            score,
            violations,
        });
    }

    scored.sort_by(rank_order);
    Ok(scored)
}

/// The free interval that came closest to fitting `required`.
pub fn nearest_miss(free: &[FreeInterval], required: Duration) -> Option<FreeInterval> {
    free.iter()
        .filter(|f| f.duration() < required)
        .max_by(|a, b| a.duration().cmp(&b.duration()).then_with(|| b.start.cmp(&a.start)))
        .cloned()
}

/// Choose the meeting start inside `interval`.
///
/// Feasible starts run from `interval.start + before` to
/// `interval.end - after - duration`. The target is the preferred time of day
/// on the local day of the earliest feasible start, clamped into range and
/// snapped to the grid if a grid point is feasible.
fn place(
    interval: &FreeInterval,
    duration: Duration,
    buffers: Buffers,
    tz: &Tz,
    config: &EngineConfig,
) -> DateTime<Utc> {
    let lo = interval.start + buffers.before;
    let hi = interval.end - buffers.after - duration;

    let local_day = lo.with_timezone(tz).date_naive();
    let target = config
        .dst_policy
        .resolve(tz, local_day.and_time(config.preferred_time_of_day))
        .unwrap_or(lo)
        .clamp(lo, hi);

    let grid = i64::from(config.slot_granularity_minutes) * 60;
    let secs = target.timestamp();
    let down = secs - secs.rem_euclid(grid);
    let up = if down == secs { secs } else { down + grid };

    [down, up]
        .into_iter()
        .filter_map(|s| DateTime::from_timestamp(s, 0))
        .filter(|s| *s >= lo && *s <= hi)
        .min_by_key(|s| (*s - target).num_seconds().abs())
        .unwrap_or(target)
}

/// 1.0 at the preferred time of day, falling linearly to 0.0 twelve hours
/// away.
fn proximity(start: DateTime<Utc>, tz: &Tz, config: &EngineConfig) -> f64 {
    let local = start.with_timezone(tz).time();
    let minutes = f64::from(local.num_seconds_from_midnight()) / 60.0;
    let preferred = f64::from(config.preferred_time_of_day.num_seconds_from_midnight()) / 60.0;
    let distance = (minutes - preferred).abs().min(MINUTES_PER_HALF_DAY);
    1.0 - distance / MINUTES_PER_HALF_DAY
}

/// Spare room beyond the required buffers on the tighter side, capped.
fn slack(interval: &FreeInterval, start: DateTime<Utc>, end: DateTime<Utc>, buffers: Buffers) -> f64 {
    let before = (start - interval.start - buffers.before).num_minutes();
    let after = (interval.end - end - buffers.after).num_minutes();
    let tighter = before.min(after).max(0) as f64;
    tighter.min(BUFFER_SLACK_CAP_MINUTES) / BUFFER_SLACK_CAP_MINUTES
}
