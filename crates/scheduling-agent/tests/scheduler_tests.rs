//! End-to-end pipeline tests with in-memory collaborators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use availability_engine::{
    ConflictKind, EngineError, Preferences, ProposedSlot, ProviderKind, SchedulingRequest,
    WorkingHours,
};
use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use scheduling_agent::{
    CalendarRef, ModelClient, ModelRequest, ModelTransport, RawCompletion, Scheduler,
    SchedulerConfig, SchedulingError, StaticCalendarSource, StaticPreferencesStore, TransportError,
};
use serde_json::{json, Value};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
}

fn prefs() -> Preferences {
    Preferences {
        user_id: "alice".to_string(),
        timezone: "UTC".to_string(),
        working_hours: [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
            .into_iter()
            .map(|weekday| WorkingHours {
                weekday,
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            })
            .collect(),
        vip_contacts: Default::default(),
        meeting_types: Default::default(),
        blackouts: Vec::new(),
    }
}

fn google(id: &str, start: &str, end: &str) -> Value {
    json!({"id": id, "start": {"dateTime": start}, "end": {"dateTime": end}})
}

/// Monday 2026-03-16: work 09:00-10:00 and 13:00-14:00, home 09:30-11:00.
fn source() -> StaticCalendarSource {
    StaticCalendarSource::new()
        .with_calendar(
            "work",
            vec![
                google("w1", "2026-03-16T09:00:00Z", "2026-03-16T10:00:00Z"),
                google("w2", "2026-03-16T13:00:00Z", "2026-03-16T14:00:00Z"),
            ],
        )
        .with_calendar(
            "home",
            vec![json!({"uid": "h1", "dtstart": "20260316T093000Z", "dtend": "20260316T110000Z"})],
        )
        .with_failure("broken", "provider returned 503")
}

fn calendars() -> Vec<CalendarRef> {
    vec![
        CalendarRef::new("work", ProviderKind::Google),
        CalendarRef::new("home", ProviderKind::Ical),
    ]
}

fn request() -> SchedulingRequest {
    SchedulingRequest {
        requester_id: "alice".to_string(),
        participants: Default::default(),
        duration_minutes: Some(60),
        earliest: at(16, 0, 0),
        latest: at(17, 0, 0),
        meeting_type: None,
        constraints: Default::default(),
    }
}

fn scheduler_with(source: StaticCalendarSource, config: SchedulerConfig) -> Scheduler {
    Scheduler::new(
        Arc::new(config),
        Arc::new(source),
        Arc::new(StaticPreferencesStore::new().with_user(prefs())),
    )
}

/// Answers every call with the same outcome.
struct FixedModel {
    answer: Result<&'static str, TransportError>,
    calls: AtomicU32,
}

impl FixedModel {
    fn new(answer: Result<&'static str, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ModelTransport for FixedModel {
    async fn complete(&self, _request: &ModelRequest) -> Result<RawCompletion, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map(|content| RawCompletion {
            content: content.to_string(),
            input_tokens: 400,
            output_tokens: 100,
            model_id: "fixed".to_string(),
        })
    }
}

fn with_model(model: Arc<FixedModel>, config: SchedulerConfig) -> Scheduler {
    let config = Arc::new(config);
    Scheduler::new(
        config.clone(),
        Arc::new(source()),
        Arc::new(StaticPreferencesStore::new().with_user(prefs())),
    )
    .with_model(ModelClient::new(model, config))
}

// ── Score order ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn schedules_across_calendars_without_model() {
    let scheduler = scheduler_with(source(), SchedulerConfig::default());

    let response = scheduler.schedule(&request(), &calendars()).await.unwrap();

    let starts: Vec<_> = response.slots.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![at(16, 11, 0), at(16, 14, 0)]);
    assert!(!response.ranked_by_model);
    assert!(response.usage.is_none());
    assert!(response.warnings.is_empty());
    assert_eq!(response.skipped_records, 0);
}

#[tokio::test]
async fn failing_calendar_becomes_a_warning() {
    let scheduler = scheduler_with(source(), SchedulerConfig::default());
    let mut cals = calendars();
    cals.push(CalendarRef::new("broken", ProviderKind::Microsoft));

    let response = scheduler.schedule(&request(), &cals).await.unwrap();

    assert_eq!(response.slots.len(), 2);
    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("broken"));
}

#[tokio::test]
async fn unreadable_records_are_counted() {
    let source = source().with_calendar(
        "work",
        vec![
            google("w1", "2026-03-16T09:00:00Z", "2026-03-16T10:00:00Z"),
            json!({"id": "junk", "start": {"dateTime": "whenever"}, "end": {"dateTime": "later"}}),
        ],
    );
    let scheduler = scheduler_with(source, SchedulerConfig::default());

    let response = scheduler.schedule(&request(), &calendars()).await.unwrap();
    assert_eq!(response.skipped_records, 1);
    assert!(response.warnings.iter().any(|w| w.contains("skipped 1")));
}

// ── Model ranking ───────────────────────────────────────────────────────────

#[tokio::test]
async fn model_ranking_reorders_slots_and_reports_usage() {
    let model = FixedModel::new(Ok(
        r#"{"ranking":[{"index":2,"rationale":"keeps the morning free for focus"}]}"#,
    ));
    let scheduler = with_model(model.clone(), SchedulerConfig::default());

    let response = scheduler.schedule(&request(), &calendars()).await.unwrap();

    assert!(response.ranked_by_model);
    assert_eq!(response.slots[0].start, at(16, 14, 0));
    assert_eq!(
        response.slots[0].rationale.as_deref(),
        Some("keeps the morning free for focus")
    );
    assert_eq!(response.slots[1].start, at(16, 11, 0));
    let usage = response.usage.unwrap();
    assert_eq!(usage.total_tokens, 500);
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn model_failure_degrades_to_score_order() {
    let model = FixedModel::new(Err(TransportError::Authentication("expired".to_string())));
    let scheduler = with_model(model, SchedulerConfig::default());

    let response = scheduler.schedule(&request(), &calendars()).await.unwrap();

    assert!(!response.ranked_by_model);
    assert!(response.usage.is_none());
    assert_eq!(response.slots[0].start, at(16, 11, 0));
    assert!(response.warnings.iter().any(|w| w.contains("model ranking unavailable")));
}

#[tokio::test]
async fn unparseable_answer_keeps_score_order_but_counts_usage() {
    let model = FixedModel::new(Ok("Monday at eleven looks best."));
    let scheduler = with_model(model, SchedulerConfig::default());

    let response = scheduler.schedule(&request(), &calendars()).await.unwrap();

    assert!(!response.ranked_by_model);
    assert!(response.usage.is_some());
    assert_eq!(response.slots[0].start, at(16, 11, 0));
    assert_eq!(response.warnings.len(), 1);
}

#[tokio::test]
async fn disabled_model_is_never_called() {
    let model = FixedModel::new(Ok(r#"{"ranking":[]}"#));
    let mut config = SchedulerConfig::default();
    config.model.enabled = false;
    let scheduler = with_model(model.clone(), config);

    let response = scheduler.schedule(&request(), &calendars()).await.unwrap();

    assert!(!response.ranked_by_model);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

// ── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_requester_is_an_error() {
    let scheduler = scheduler_with(source(), SchedulerConfig::default());
    let mut req = request();
    req.requester_id = "bob".to_string();

    let err = scheduler.schedule(&req, &calendars()).await.unwrap_err();
    assert!(matches!(err, SchedulingError::PreferencesNotFound(user) if user == "bob"));
}

#[tokio::test]
async fn request_at_the_edge_of_time_is_rejected() {
    let scheduler = scheduler_with(source(), SchedulerConfig::default());
    let mut req = request();
    req.earliest = DateTime::<Utc>::MAX_UTC - chrono::Duration::hours(2);
    req.latest = DateTime::<Utc>::MAX_UTC;

    let err = scheduler.schedule(&req, &calendars()).await.unwrap_err();
    assert!(matches!(err, SchedulingError::Engine(EngineError::InvalidRequest(_))));

    let check = scheduler
        .check_slot(
            "alice",
            &ProposedSlot::new(DateTime::<Utc>::MIN_UTC, at(16, 10, 0)),
            &calendars(),
        )
        .await
        .unwrap_err();
    assert!(matches!(check, SchedulingError::Engine(EngineError::InvalidRequest(_))));
}

#[tokio::test]
async fn fully_booked_day_returns_partial_computation() {
    let source = StaticCalendarSource::new()
        .with_calendar(
            "work",
            vec![google("all-day", "2026-03-16T09:00:00Z", "2026-03-16T17:00:00Z")],
        )
        .with_failure("broken", "timeout");
    let scheduler = scheduler_with(source, SchedulerConfig::default());
    let cals = vec![
        CalendarRef::new("work", ProviderKind::Google),
        CalendarRef::new("broken", ProviderKind::Google),
    ];

    let err = scheduler.schedule(&request(), &cals).await.unwrap_err();

    match err {
        SchedulingError::NoAvailability {
            nearest_miss,
            partial,
            ..
        } => {
            assert!(nearest_miss.is_none());
            assert_eq!(partial.availability.busy.len(), 1);
            assert!(partial.availability.free.is_empty());
            assert_eq!(partial.warnings.len(), 1);
        }
        other => panic!("expected NoAvailability, got {:?}", other),
    }
}

// ── Availability and point checks ───────────────────────────────────────────

#[tokio::test]
async fn availability_view_merges_calendars() {
    let scheduler = scheduler_with(source(), SchedulerConfig::default());

    let report = scheduler
        .availability("alice", &calendars(), at(16, 0, 0), at(17, 0, 0))
        .await
        .unwrap();

    let busy: Vec<_> = report
        .availability
        .busy
        .iter()
        .map(|b| (b.start, b.end))
        .collect();
    assert_eq!(
        busy,
        vec![(at(16, 9, 0), at(16, 11, 0)), (at(16, 13, 0), at(16, 14, 0))]
    );
    assert_eq!(report.availability.free.len(), 2);
}

#[tokio::test]
async fn check_slot_reports_overlap_with_remediation() {
    let scheduler = scheduler_with(source(), SchedulerConfig::default());

    let check = scheduler
        .check_slot(
            "alice",
            &ProposedSlot::new(at(16, 10, 30), at(16, 11, 30)),
            &calendars(),
        )
        .await
        .unwrap();

    let conflict = check.conflict.unwrap();
    assert_eq!(conflict.kind, ConflictKind::HardOverlap);
    assert_eq!(conflict.conflicting[0].sources.len(), 2);
    assert_eq!(conflict.remediation.unwrap().alternate_start, at(16, 11, 0));
}

#[tokio::test]
async fn check_slot_accepts_free_time() {
    let scheduler = scheduler_with(source(), SchedulerConfig::default());
    let check = scheduler
        .check_slot(
            "alice",
            &ProposedSlot::new(at(16, 15, 0), at(16, 16, 0)),
            &calendars(),
        )
        .await
        .unwrap();
    assert!(check.conflict.is_none());
}
