//! Window-bounded recurrence expansion.
//!
//! Wraps the `rrule` crate and `chrono-tz`. Only instances intersecting the
//! query window are materialized, and never more than the configured cap, so
//! an open-ended rule like `FREQ=DAILY` is safe to expand.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::error::{EngineError, Result};

/// A single expanded instance with start and end times.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Expand recurrence lines into the instances intersecting
/// `[window_start, window_end)`.
///
/// # Arguments
/// - `rules` -- RFC 5545 content lines (`RRULE:...`, `EXDATE;TZID=...:...`,
///   `RDATE...`). A bare `FREQ=...` line is treated as an RRULE.
/// - `dtstart` -- Start of the first instance.
/// - `duration` -- Length of each instance.
/// - `timezone` -- IANA timezone the rule is evaluated in (wall-clock
///   recurrence across DST).
/// - `max_instances` -- Hard cap on materialized instances.
///
/// # Errors
/// Returns `EngineError::InvalidRule` if no rule is given or it fails to
/// parse, `EngineError::InvalidTimezone` for an unknown timezone.
pub fn expand_in_window(
    rules: &[String],
    dtstart: DateTime<Utc>,
    duration: Duration,
    timezone: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    max_instances: u16,
) -> Result<Vec<ExpandedEvent>> {
    let lines: Vec<String> = rules
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| {
            if l.to_uppercase().starts_with("FREQ=") {
                format!("RRULE:{}", l)
            } else {
                l.to_string()
            }
        })
        .collect();
    if !lines.iter().any(|l| l.to_uppercase().starts_with("RRULE")) {
        return Err(EngineError::InvalidRule("no RRULE line".to_string()));
    }
    if window_start >= window_end || max_instances == 0 {
        return Ok(Vec::new());
    }

    let tz: Tz = timezone
        .parse()
        .map_err(|_| EngineError::InvalidTimezone(timezone.to_string()))?;

    // iCalendar basic format in the rule's own timezone, e.g. "20260217T140000".
    let dtstart_ical = dtstart.with_timezone(&tz).format("%Y%m%dT%H%M%S");
    let rrule_text = format!("DTSTART;TZID={}:{}\n{}", tz.name(), dtstart_ical, lines.join("\n"));

    let rrule_set: RRuleSet = rrule_text
        .parse()
        .map_err(|e| EngineError::InvalidRule(format!("{}", e)))?;

    // An instance starting up to `duration` before the window still overlaps it.
    let lower = (window_start - duration).with_timezone(&rrule::Tz::UTC);
    let upper = window_end.with_timezone(&rrule::Tz::UTC);
    let result = rrule_set.after(lower).before(upper).all(max_instances);
    if result.limited {
        tracing::warn!(
            max_instances,
            %window_start,
            %window_end,
            "recurrence expansion hit the instance cap; later instances dropped"
        );
    }

    Ok(result
        .dates
        .into_iter()
        .map(|dt| {
            let start = dt.with_timezone(&Utc);
            ExpandedEvent {
                start,
                end: start + duration,
            }
        })
        .filter(|e| e.start < window_end && e.end > window_start)
        .collect())
}
