//! `schedule` CLI: recommend meeting slots, show availability and check a
//! proposed slot from a JSON bundle of calendar exports.
//!
//! ## Usage
//!
//! ```sh
//! # Recommend slots for the bundle's request (stdin → stdout)
//! schedule recommend < bundle.json
//!
//! # Let the configured model re-rank the candidates
//! schedule --config scheduler.toml recommend -i bundle.json --with-model
//!
//! # Merged busy/free view over the request window
//! schedule availability -i bundle.json
//!
//! # Check one slot
//! schedule check -i bundle.json --start 2026-03-16T10:30:00Z --end 2026-03-16T11:30:00Z
//!
//! # Print the effective configuration (file + SCHEDULER_* overrides)
//! schedule config
//! ```
//!
//! A bundle looks like:
//!
//! ```json
//! {
//!   "request": { "requester_id": "alice", "duration_minutes": 60,
//!                "earliest": "2026-03-16T00:00:00Z", "latest": "2026-03-17T00:00:00Z" },
//!   "preferences": { "user_id": "alice", "timezone": "Europe/Berlin", "working_hours": [] },
//!   "calendars": [ { "calendar_id": "work", "provider": "google", "records": [] } ]
//! }
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use availability_engine::{Preferences, ProposedSlot, ProviderKind, SchedulingRequest};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use scheduling_agent::{
    CalendarRef, HttpTransport, ModelClient, Scheduler, SchedulerConfig, SchedulingError,
    StaticCalendarSource, StaticPreferencesStore,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

/// Exit code when no slot satisfies the request.
const EXIT_NO_AVAILABILITY: i32 = 2;

#[derive(Parser)]
#[command(
    name = "schedule",
    version,
    about = "Find meeting slots across calendars"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend slots for the bundle's request
    Recommend {
        /// Input bundle (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Ask the configured model to re-rank the candidates
        #[arg(long)]
        with_model: bool,
        /// Give up on the model after this many seconds
        #[arg(long, requires = "with_model")]
        deadline_secs: Option<u64>,
    },
    /// Show merged busy and free time
    Availability {
        #[arg(short, long)]
        input: Option<String>,
        #[arg(short, long)]
        output: Option<String>,
        /// Window start (defaults to the request's earliest bound)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Window end (defaults to the request's latest bound)
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// Check one proposed slot for conflicts
    Check {
        #[arg(short, long)]
        input: Option<String>,
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        /// Meeting type whose buffers apply
        #[arg(long)]
        meeting_type: Option<String>,
        /// Participant address (repeatable)
        #[arg(long = "participant")]
        participants: Vec<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Everything one run needs, in a single JSON document.
#[derive(Deserialize)]
struct Bundle {
    #[serde(default)]
    request: Option<SchedulingRequest>,
    preferences: Preferences,
    #[serde(default)]
    calendars: Vec<CalendarExport>,
}

#[derive(Deserialize)]
struct CalendarExport {
    calendar_id: String,
    provider: ProviderKind,
    #[serde(default)]
    records: Vec<Value>,
}

impl Bundle {
    fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse input bundle")
    }

    fn calendar_refs(&self) -> Vec<CalendarRef> {
        self.calendars
            .iter()
            .map(|c| CalendarRef::new(c.calendar_id.clone(), c.provider))
            .collect()
    }

    fn into_scheduler(self, config: Arc<SchedulerConfig>) -> (Scheduler, Vec<CalendarRef>) {
        let refs = self.calendar_refs();
        let source = self
            .calendars
            .into_iter()
            .fold(StaticCalendarSource::new(), |source, c| {
                source.with_calendar(c.calendar_id, c.records)
            });
        let store = StaticPreferencesStore::new().with_user(self.preferences);
        (Scheduler::new(config, Arc::new(source), Arc::new(store)), refs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(
        SchedulerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?,
    );

    match cli.command {
        Commands::Recommend {
            input,
            output,
            with_model,
            deadline_secs,
        } => {
            let bundle = Bundle::parse(&read_input(input.as_deref())?)?;
            let request = bundle
                .request
                .clone()
                .context("Bundle has no \"request\" to recommend slots for")?;
            let (mut scheduler, calendars) = bundle.into_scheduler(config.clone());

            if with_model {
                if config.model.enabled {
                    let transport = HttpTransport::from_config(&config.model)
                        .context("Failed to set up the model transport")?;
                    scheduler = scheduler.with_model(ModelClient::new(Arc::new(transport), config.clone()));
                } else {
                    tracing::warn!("--with-model given but model.enabled is false; using score order");
                }
            }

            let deadline = deadline_secs
                .and_then(|s| tokio::time::Instant::now().checked_add(Duration::from_secs(s)));
            match scheduler.schedule_until(&request, &calendars, deadline).await {
                Ok(response) => write_json(output.as_deref(), &serde_json::to_value(&response)?)?,
                Err(SchedulingError::NoAvailability {
                    reason,
                    nearest_miss,
                    partial,
                }) => {
                    let report = json!({
                        "error": "no_availability",
                        "reason": reason,
                        "nearest_miss": nearest_miss,
                        "availability": partial.availability,
                        "warnings": partial.warnings,
                        "skipped_records": partial.skipped_records,
                    });
                    write_json(output.as_deref(), &report)?;
                    process::exit(EXIT_NO_AVAILABILITY);
                }
                Err(e) => return Err(e).context("Scheduling failed"),
            }
        }
        Commands::Availability {
            input,
            output,
            start,
            end,
        } => {
            let bundle = Bundle::parse(&read_input(input.as_deref())?)?;
            let window = bundle.request.as_ref().map(|r| (r.earliest, r.latest));
            let start = start
                .or(window.map(|w| w.0))
                .context("No window start: pass --start or include a request")?;
            let end = end
                .or(window.map(|w| w.1))
                .context("No window end: pass --end or include a request")?;
            let user_id = bundle.preferences.user_id.clone();
            let (scheduler, calendars) = bundle.into_scheduler(config);

            let report = scheduler
                .availability(&user_id, &calendars, start, end)
                .await
                .context("Availability failed")?;
            write_json(output.as_deref(), &serde_json::to_value(&report)?)?;
        }
        Commands::Check {
            input,
            output,
            start,
            end,
            meeting_type,
            participants,
        } => {
            let bundle = Bundle::parse(&read_input(input.as_deref())?)?;
            let user_id = bundle.preferences.user_id.clone();
            let (scheduler, calendars) = bundle.into_scheduler(config);

            let mut proposed = ProposedSlot::new(start, end);
            proposed.meeting_type = meeting_type;
            proposed.participants = participants.into_iter().collect();

            let check = scheduler
                .check_slot(&user_id, &proposed, &calendars)
                .await
                .context("Conflict check failed")?;
            write_json(output.as_deref(), &serde_json::to_value(&check)?)?;
        }
        Commands::Config => {
            let text = toml::to_string_pretty(config.as_ref()).context("Failed to render configuration")?;
            print!("{}", text);
        }
    }

    Ok(())
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_json(path: Option<&str>, value: &Value) -> Result<()> {
    let pretty = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            std::fs::write(path, pretty + "\n")
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            println!("{}", pretty);
        }
    }
    Ok(())
}
