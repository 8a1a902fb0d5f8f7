//! # scheduling-agent
//!
//! Async orchestration around `availability-engine`: fetches every connected
//! calendar concurrently, runs the deterministic planner, then asks a
//! language model to order the surviving candidates and explain them.
//!
//! The model is optional. When it is disabled, unreachable or answers
//! nonsense, the engine's score order is returned with a warning.
//!
//! ```no_run
//! use std::sync::Arc;
//! use scheduling_agent::{
//!     HttpTransport, ModelClient, Scheduler, SchedulerConfig, StaticCalendarSource,
//!     StaticPreferencesStore,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(SchedulerConfig::load(None)?);
//! let transport = Arc::new(HttpTransport::from_config(&config.model)?);
//! let scheduler = Scheduler::new(
//!     config.clone(),
//!     Arc::new(StaticCalendarSource::new()),
//!     Arc::new(StaticPreferencesStore::new()),
//! )
//! .with_model(ModelClient::new(transport, config));
//! # let _ = scheduler;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod reasoning;
pub mod scheduler;
pub mod sources;

pub use config::{ModelConfig, SchedulerConfig};
pub use error::{CalendarFetchError, ConfigError, ModelServiceError, PartialComputation, SchedulingError};
pub use model::{
    estimate_cost, HttpTransport, ModelClient, ModelRequest, ModelResponse, ModelTransport,
    RawCompletion, TokenUsage, TransportError,
};
pub use scheduler::{AvailabilityReport, ScheduleResponse, Scheduler, SlotCheck};
pub use sources::{
    CalendarRef, CalendarSource, PreferencesStore, StaticCalendarSource, StaticPreferencesStore,
};
