//! The scheduling pipeline.
//!
//! fetch (concurrent) → normalize → plan (aggregate, free, score,
//! recommend) → model ranking. Only a missing preferences record, an
//! invalid request or an empty result fail the request; a calendar that
//! cannot be fetched, a record that cannot be read or a model that cannot
//! be reached are reported as warnings.

use std::collections::BTreeMap;
use std::sync::Arc;

use availability_engine::{
    aggregate, compute_availability, detect_conflicts, plan, CalendarEvent, CandidateSlot,
    ConflictReport, EngineError, Normalizer, Preferences, ProposedSlot, SchedulingRequest,
    UnifiedAvailability,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::error::{PartialComputation, Result, SchedulingError};
use crate::model::{ModelClient, TokenUsage};
use crate::reasoning::{apply_ranking, build_prompt};
use crate::sources::{CalendarRef, CalendarSource, PreferencesStore};

/// Outcome of a scheduling request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleResponse {
    /// Best first.
    pub slots: Vec<CandidateSlot>,
    /// Candidates dropped during re-validation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub warnings: Vec<String>,
    pub skipped_records: usize,
    /// False when the order is the engine's score order.
    pub ranked_by_model: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilityReport {
    pub availability: UnifiedAvailability,
    pub warnings: Vec<String>,
    pub skipped_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotCheck {
    pub conflict: Option<ConflictReport>,
    pub warnings: Vec<String>,
    pub skipped_records: usize,
}

/// Normalized events from every calendar that answered.
struct Gathered {
    events: BTreeMap<String, Vec<CalendarEvent>>,
    warnings: Vec<String>,
    skipped_records: usize,
}

pub struct Scheduler {
    config: Arc<SchedulerConfig>,
    calendars: Arc<dyn CalendarSource>,
    preferences: Arc<dyn PreferencesStore>,
    model: Option<ModelClient>,
}

impl Scheduler {
    pub fn new(
        config: Arc<SchedulerConfig>,
        calendars: Arc<dyn CalendarSource>,
        preferences: Arc<dyn PreferencesStore>,
    ) -> Self {
        Self {
            config,
            calendars,
            preferences,
            model: None,
        }
    }

    /// Rank candidates with `client` when `model.enabled` is set.
    pub fn with_model(mut self, client: ModelClient) -> Self {
        self.model = Some(client);
        self
    }

    pub async fn schedule(
        &self,
        request: &SchedulingRequest,
        calendars: &[CalendarRef],
    ) -> Result<ScheduleResponse> {
        self.schedule_until(request, calendars, None).await
    }

    /// Run the pipeline; the model call gives up at `deadline`.
    pub async fn schedule_until(
        &self,
        request: &SchedulingRequest,
        calendars: &[CalendarRef],
        deadline: Option<Instant>,
    ) -> Result<ScheduleResponse> {
        let preferences = self.load_preferences(&request.requester_id).await?;
        let (around_start, around_end) = self
            .config
            .engine
            .look_around(request.earliest, request.latest)?;
        let gathered = self.gather(calendars, around_start, around_end).await;
        let Gathered {
            events,
            mut warnings,
            skipped_records,
        } = gathered;

        let planned = match plan(request, &events, &preferences, &self.config.engine) {
            Ok(planned) => planned,
            Err(EngineError::NoAvailability {
                reason,
                nearest_miss,
                availability,
            }) => {
                tracing::info!(requester = %request.requester_id, %reason, "no availability");
                return Err(SchedulingError::NoAvailability {
                    reason,
                    nearest_miss,
                    partial: Box::new(PartialComputation {
                        availability: *availability,
                        warnings,
                        skipped_records,
                    }),
                });
            }
            Err(other) => return Err(other.into()),
        };

        let mut slots = planned.recommendation.slots;
        let mut usage = None;
        let mut ranked_by_model = false;

        if let Some(client) = self.model.as_ref().filter(|_| self.config.model.enabled) {
            let prompt = build_prompt(request, &preferences, &slots);
            match client.invoke_until(&client.request(prompt), deadline).await {
                Ok(response) => {
                    match apply_ranking(slots.clone(), &response.content) {
                        Ok(ranked) => {
                            slots = ranked;
                            ranked_by_model = true;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "model answer was not a ranking; keeping score order");
                            warnings.push(format!("model answer could not be parsed: {}", e));
                        }
                    }
                    usage = Some(response.usage);
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempts = e.attempts(), "model ranking unavailable; keeping score order");
                    warnings.push(format!("model ranking unavailable: {}", e));
                }
            }
        }

        tracing::debug!(
            slots = slots.len(),
            conflicts = planned.recommendation.rejected.len(),
            ranked_by_model,
            "schedule complete"
        );
        Ok(ScheduleResponse {
            slots,
            conflicts: planned.recommendation.rejected,
            usage,
            warnings,
            skipped_records,
            ranked_by_model,
        })
    }

    /// Unified busy/free view for `user_id` over `[start, end)`.
    pub async fn availability(
        &self,
        user_id: &str,
        calendars: &[CalendarRef],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AvailabilityReport> {
        let preferences = self.load_preferences(user_id).await?;
        let gathered = self.gather(calendars, start, end).await;
        let availability = compute_availability(
            &gathered.events,
            start,
            end,
            Some(&preferences),
            &self.config.engine,
        )?;
        Ok(AvailabilityReport {
            availability,
            warnings: gathered.warnings,
            skipped_records: gathered.skipped_records,
        })
    }

    /// Check one proposed meeting against live calendar data.
    pub async fn check_slot(
        &self,
        user_id: &str,
        proposed: &ProposedSlot,
        calendars: &[CalendarRef],
    ) -> Result<SlotCheck> {
        let preferences = self.load_preferences(user_id).await?;
        let (start, end) = self.config.engine.look_around(proposed.start, proposed.end)?;
        let gathered = self.gather(calendars, start, end).await;
        let busy = aggregate(&gathered.events, start, end, &self.config.engine);
        let conflict = detect_conflicts(proposed, &busy, &preferences, &self.config.engine)?;
        Ok(SlotCheck {
            conflict,
            warnings: gathered.warnings,
            skipped_records: gathered.skipped_records,
        })
    }

    async fn load_preferences(&self, user_id: &str) -> Result<Preferences> {
        let preferences = self
            .preferences
            .get(user_id)
            .await
            .ok_or_else(|| SchedulingError::PreferencesNotFound(user_id.to_string()))?;
        preferences.validate()?;
        Ok(preferences)
    }

    /// Fetch every calendar concurrently and normalize what came back.
    async fn gather(
        &self,
        calendars: &[CalendarRef],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Gathered {
        let fetches = calendars
            .iter()
            .map(|calendar| self.calendars.fetch(calendar, start, end));
        let results = join_all(fetches).await;

        let engine = &self.config.engine;
        let mut gathered = Gathered {
            events: BTreeMap::new(),
            warnings: Vec::new(),
            skipped_records: 0,
        };

        for (calendar, result) in calendars.iter().zip(results) {
            let records = match result {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(calendar_id = %calendar.calendar_id, error = %e, "calendar fetch failed");
                    gathered.warnings.push(e.to_string());
                    continue;
                }
            };

            let batch = Normalizer::new(calendar.calendar_id.clone(), start, end)
                .with_limits(engine.max_recurrence_instances, engine.dst_policy)
                .normalize(&records, calendar.provider);
            if batch.skipped_count() > 0 {
                gathered.warnings.push(format!(
                    "calendar {}: skipped {} unreadable record(s)",
                    calendar.calendar_id,
                    batch.skipped_count()
                ));
            }
            tracing::debug!(
                calendar_id = %calendar.calendar_id,
                events = batch.events.len(),
                skipped = batch.skipped_count(),
                dropped = batch.dropped,
                "calendar normalized"
            );
            gathered.skipped_records += batch.skipped_count();
            gathered
                .events
                .entry(calendar.calendar_id.clone())
                .or_default()
                .extend(batch.events);
        }
        gathered
    }
}
