//! The synchronous request pipeline: aggregate → free intervals → score →
//! recommend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::availability::{aggregate, UnifiedAvailability};
use crate::config::EngineConfig;
use crate::constraints::{filter_and_score, nearest_miss};
use crate::error::{EngineError, Result};
use crate::event::CalendarEvent;
use crate::freebusy::free_intervals;
use crate::preferences::Preferences;
use crate::recommender::{Recommendation, Recommender};
use crate::request::SchedulingRequest;

/// Everything the pipeline produced for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub availability: UnifiedAvailability,
    pub recommendation: Recommendation,
}

/// Run the scheduling pipeline over already-normalized events.
///
/// Busy time is aggregated over the request bounds widened by
/// `look_around_days` so that re-validation and remediation see the
/// neighbourhood; free intervals are confined to `[earliest, latest)`.
///
/// # Errors
/// `EngineError::NoAvailability` when nothing fits, carrying the nearest
/// miss and the availability computed so far.
pub fn plan(
    request: &SchedulingRequest,
    events_by_calendar: &BTreeMap<String, Vec<CalendarEvent>>,
    preferences: &Preferences,
    config: &EngineConfig,
) -> Result<Plan> {
    preferences.validate()?;
    let duration = request.validate(preferences)?;
    let buffers = request.buffers(preferences)?;

    let (around_start, around_end) = config.look_around(request.earliest, request.latest)?;
    let busy = aggregate(events_by_calendar, around_start, around_end, config);

    let mask = if request.enforces_working_hours(preferences) {
        preferences.working_mask(request.earliest, request.latest, config.dst_policy)?
    } else {
        preferences.day_mask(request.earliest, request.latest, config.dst_policy)?
    };
    let free = free_intervals(&busy, &mask, &preferences.blackouts);
    tracing::debug!(
        busy = busy.len(),
        free = free.len(),
        mask = mask.len(),
        "availability computed"
    );

    let availability = UnifiedAvailability {
        busy,
        free,
        window_start: request.earliest,
        window_end: request.latest,
    };

    let scored = filter_and_score(&availability.free, preferences, request, config)?;
    if scored.is_empty() {
        return Err(EngineError::NoAvailability {
            reason: format!(
                "no free interval between {} and {} fits a {} minute meeting with {} minutes of buffers",
                request.earliest,
                request.latest,
                duration.num_minutes(),
                buffers.total().num_minutes()
            ),
            nearest_miss: nearest_miss(&availability.free, duration + buffers.total()),
            availability: Box::new(availability),
        });
    }

    let recommendation = Recommender::new(&availability.busy, preferences, config)
        .recommend(request, scored, config.top_n)?;
    if recommendation.slots.is_empty() {
        return Err(EngineError::NoAvailability {
            reason: format!(
                "all {} re-validated candidates conflicted",
                recommendation.rejected.len()
            ),
            nearest_miss: None,
            availability: Box::new(availability),
        });
    }

    Ok(Plan {
        availability,
        recommendation,
    })
}
