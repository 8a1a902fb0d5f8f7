//! # availability-engine
//!
//! Deterministic multi-calendar availability for AI scheduling agents.
//!
//! The engine merges busy time from any number of connected calendars into a
//! single timeline, carves free time out of the user's working hours, scores
//! placements against their preferences and checks proposed meetings for
//! conflicts. Everything here is synchronous and free of I/O; fetching
//! calendars and calling language models happens in `scheduling-agent`.
//!
//! ## Modules
//!
//! - [`normalizer`]: provider records → canonical [`CalendarEvent`]s
//! - [`expander`]: window-bounded RRULE expansion
//! - [`availability`]: merge N calendars into one busy/free view
//! - [`freebusy`]: interval merge and subtraction primitives
//! - [`constraints`]: filter and score free intervals
//! - [`conflict`]: classify conflicts of a proposed meeting
//! - [`recommender`]: top-N selection with re-validation
//! - [`planner`]: the whole pipeline for one request
//! - [`preferences`], [`request`], [`event`]: data model
//! - [`config`], [`dst`], [`error`]

pub mod availability;
pub mod config;
pub mod conflict;
pub mod constraints;
pub mod dst;
pub mod error;
pub mod event;
pub mod expander;
pub mod freebusy;
pub mod normalizer;
pub mod planner;
pub mod preferences;
pub mod recommender;
pub mod request;

pub use availability::{aggregate, compute_availability, UnifiedAvailability};
pub use config::{EngineConfig, ScoringWeights};
pub use conflict::{detect_conflicts, ConflictKind, ConflictReport, ProposedSlot, Remediation};
pub use constraints::{filter_and_score, ScoredInterval};
pub use dst::DstPolicy;
pub use error::EngineError;
pub use event::{CalendarEvent, EventStatus, Transparency};
pub use freebusy::{free_intervals, BusyInterval, BusySource, FreeInterval};
pub use normalizer::{NormalizationError, NormalizedBatch, Normalizer, ProviderKind};
pub use planner::{plan, Plan};
pub use preferences::{Blackout, MaskWindow, MeetingType, Preferences, WorkingHours};
pub use recommender::{Recommendation, Recommender};
pub use request::{CandidateSlot, HardConstraints, SchedulingRequest, Violation};
