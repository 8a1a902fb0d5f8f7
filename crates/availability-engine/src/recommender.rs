//! Top-N slot selection with last-moment re-validation.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::conflict::{detect_conflicts, ConflictReport, ProposedSlot};
use crate::constraints::{rank_order, ScoredInterval};
use crate::error::Result;
use crate::freebusy::BusyInterval;
use crate::preferences::Preferences;
use crate::request::{CandidateSlot, SchedulingRequest};

/// Selected slots plus the conflicts that knocked candidates out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub slots: Vec<CandidateSlot>,
    pub rejected: Vec<ConflictReport>,
}

/// Picks the best candidates and re-checks each against the busy timeline.
pub struct Recommender<'a> {
    pub busy: &'a [BusyInterval],
    pub preferences: &'a Preferences,
    pub config: &'a EngineConfig,
}

impl<'a> Recommender<'a> {
    pub fn new(busy: &'a [BusyInterval], preferences: &'a Preferences, config: &'a EngineConfig) -> Self {
        Self {
            busy,
            preferences,
            config,
        }
    }

    /// Return up to `top_n` slots, best first (ties: earliest start).
    ///
    /// Each pick runs through conflict detection. A conflicting pick is
    /// dropped and the next-best candidate takes its place, at most
    /// `config.max_replacements` times; after that the list is returned
    /// short rather than searching further.
    pub fn recommend(
        &self,
        request: &SchedulingRequest,
        mut scored: Vec<ScoredInterval>,
        top_n: usize,
    ) -> Result<Recommendation> {
        scored.sort_by(rank_order);

        let mut slots = Vec::with_capacity(top_n);
        let mut rejected = Vec::new();
        let mut replacements = 0;

        for candidate in scored {
            if slots.len() >= top_n {
                break;
            }
            let proposed = ProposedSlot {
                start: candidate.slot_start,
                end: candidate.slot_end,
                meeting_type: request.meeting_type.clone(),
                participants: request.participants.clone(),
                within_working_hours: request.constraints.within_working_hours,
                allow_vip_override: request.constraints.allow_vip_override,
            };

            match detect_conflicts(&proposed, self.busy, self.preferences, self.config)? {
                None => slots.push(candidate.to_candidate()),
                Some(report) => {
                    tracing::debug!(
                        kind = ?report.kind,
                        start = %report.start,
                        "dropping candidate that no longer validates"
                    );
                    rejected.push(report);
                    if replacements >= self.config.max_replacements {
                        break;
                    }
                    replacements += 1;
                }
            }
        }

        Ok(Recommendation { slots, rejected })
    }
}
