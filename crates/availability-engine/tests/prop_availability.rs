//! Property-based tests for aggregation, free intervals and recommendations.
//!
//! Intervals are generated on a minute grid over a single day so coverage can
//! be compared minute by minute.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc, Weekday};
use proptest::prelude::*;
use availability_engine::availability::{aggregate, reaggregate};
use availability_engine::freebusy::free_intervals;
use availability_engine::{
    detect_conflicts, filter_and_score, CalendarEvent, ConflictKind, EngineConfig, Preferences,
    ProposedSlot, Recommender, SchedulingRequest, WorkingHours,
};

const DAY_MINUTES: i64 = 24 * 60;

fn day_start() -> DateTime<Utc> {
    // A Monday.
    Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).unwrap()
}

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    }
}

/// (calendar index, start minute, length minutes)
fn arb_events() -> impl Strategy<Value = Vec<(u8, i64, i64)>> {
    prop::collection::vec((0u8..3, 0i64..DAY_MINUTES - 1, 1i64..240), 0..25)
}

fn build(events: &[(u8, i64, i64)]) -> BTreeMap<String, Vec<CalendarEvent>> {
    let mut by_calendar: BTreeMap<String, Vec<CalendarEvent>> = BTreeMap::new();
    for (i, (cal, start, len)) in events.iter().enumerate() {
        let calendar_id = format!("cal-{}", cal);
        let start = day_start() + Duration::minutes(*start);
        let end = start + Duration::minutes(*len);
        by_calendar
            .entry(calendar_id.clone())
            .or_default()
            .push(CalendarEvent::new(format!("e{}", i), calendar_id, start, end).unwrap());
    }
    by_calendar
}

fn covered(ranges: &[(DateTime<Utc>, DateTime<Utc>)], minute: i64) -> bool {
    let t = day_start() + Duration::minutes(minute);
    ranges.iter().any(|(s, e)| *s <= t && t < *e)
}

fn prefs() -> Preferences {
    Preferences {
        user_id: "u1".to_string(),
        timezone: "UTC".to_string(),
        working_hours: vec![WorkingHours {
            weekday: Weekday::Mon,
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        }],
        vip_contacts: Default::default(),
        meeting_types: Default::default(),
        blackouts: Vec::new(),
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn merged_output_is_sorted_and_disjoint(events in arb_events()) {
        let window_end = day_start() + Duration::days(1);
        let busy = aggregate(&build(&events), day_start(), window_end, &EngineConfig::default());
        for pair in busy.windows(2) {
            // Strict: touching intervals would have been merged.
            prop_assert!(pair[0].end < pair[1].start, "{:?} / {:?}", pair[0], pair[1]);
        }
        for b in &busy {
            prop_assert!(b.start < b.end);
            prop_assert!(!b.sources.is_empty());
        }
    }

    #[test]
    fn merge_neither_loses_nor_invents_time(events in arb_events()) {
        let window_end = day_start() + Duration::days(1);
        let by_calendar = build(&events);
        let busy = aggregate(&by_calendar, day_start(), window_end, &EngineConfig::default());

        let inputs: Vec<_> = by_calendar.values().flatten().map(|e| (e.start, e.end.min(window_end))).collect();
        let outputs: Vec<_> = busy.iter().map(|b| (b.start, b.end)).collect();
        for minute in 0..DAY_MINUTES {
            prop_assert_eq!(covered(&inputs, minute), covered(&outputs, minute), "minute {}", minute);
        }
    }

    #[test]
    fn every_source_event_is_traceable(events in arb_events()) {
        let window_end = day_start() + Duration::days(1);
        let by_calendar = build(&events);
        let busy = aggregate(&by_calendar, day_start(), window_end, &EngineConfig::default());
        let traced: usize = busy.iter().map(|b| b.sources.len()).sum();
        prop_assert_eq!(traced, events.len());
    }

    #[test]
    fn reaggregation_is_idempotent(events in arb_events()) {
        let window_end = day_start() + Duration::days(1);
        let busy = aggregate(&build(&events), day_start(), window_end, &EngineConfig::default());
        prop_assert_eq!(reaggregate(&busy, day_start(), window_end), busy);
    }

    #[test]
    fn free_never_intersects_busy(events in arb_events()) {
        let window_end = day_start() + Duration::days(1);
        let busy = aggregate(&build(&events), day_start(), window_end, &EngineConfig::default());
        let mask = prefs()
            .working_mask(day_start(), window_end, Default::default())
            .unwrap();
        let free = free_intervals(&busy, &mask, &[]);

        for f in &free {
            prop_assert!(f.start < f.end, "zero-length free interval");
            for b in &busy {
                prop_assert!(!b.overlaps(f.start, f.end), "free {:?} overlaps busy {:?}", f, b);
            }
        }
        for pair in free.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn recommended_slots_never_hard_overlap(events in arb_events(), minutes in 15u32..120) {
        let window_end = day_start() + Duration::days(1);
        let config = EngineConfig::default();
        let prefs = prefs();
        let busy = aggregate(&build(&events), day_start(), window_end, &config);
        let mask = prefs.working_mask(day_start(), window_end, config.dst_policy).unwrap();
        let free = free_intervals(&busy, &mask, &[]);

        let request = SchedulingRequest {
            requester_id: "u1".to_string(),
            participants: Default::default(),
            duration_minutes: Some(minutes),
            earliest: day_start(),
            latest: window_end,
            meeting_type: None,
            constraints: Default::default(),
        };
        let scored = filter_and_score(&free, &prefs, &request, &config).unwrap();
        let recommendation = Recommender::new(&busy, &prefs, &config)
            .recommend(&request, scored, config.top_n)
            .unwrap();

        for slot in &recommendation.slots {
            let report = detect_conflicts(&ProposedSlot::new(slot.start, slot.end), &busy, &prefs, &config).unwrap();
            prop_assert!(
                !matches!(report, Some(ref r) if r.kind == ConflictKind::HardOverlap),
                "slot {:?} overlaps busy time", slot
            );
        }
        for pair in recommendation.slots.windows(2) {
            prop_assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].start < pair[1].start)
            );
        }
    }
}
