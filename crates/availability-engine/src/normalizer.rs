//! Provider-native event records → canonical [`CalendarEvent`]s.
//!
//! Three record shapes are understood:
//!
//! - [`ProviderKind::Google`]: Google Calendar API v3 event resources
//! - [`ProviderKind::Microsoft`]: Microsoft Graph `calendarView` events
//! - [`ProviderKind::Ical`]: iCalendar VEVENT properties as JSON
//!
//! Records that cannot be read (missing or unparseable time range, unknown
//! timezone, broken recurrence rule) are skipped and reported in
//! [`NormalizedBatch::skipped`]; they never fail the batch.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dst::DstPolicy;
use crate::event::{CalendarEvent, EventStatus, Transparency};
use crate::expander::expand_in_window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Microsoft,
    Ical,
}

/// A record the normalizer had to skip.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("record {record_index}: {reason}")]
pub struct NormalizationError {
    pub record_index: usize,
    pub event_id: Option<String>,
    pub reason: String,
}

/// Result of normalizing one provider batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub events: Vec<CalendarEvent>,
    pub skipped: Vec<NormalizationError>,
    /// Cancelled or declined instances that were filtered out.
    pub dropped: usize,
}

impl NormalizedBatch {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Normalizes one calendar's records into a request window.
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub calendar_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub max_instances: u16,
    pub dst_policy: DstPolicy,
}

impl Normalizer {
    pub fn new(
        calendar_id: impl Into<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            window_start,
            window_end,
            max_instances: 500,
            dst_policy: DstPolicy::default(),
        }
    }

    pub fn with_limits(mut self, max_instances: u16, dst_policy: DstPolicy) -> Self {
        self.max_instances = max_instances;
        self.dst_policy = dst_policy;
        self
    }

    /// Normalize a batch of records. Instances outside the window,
    /// cancelled instances and instances the owner declined are dropped.
    pub fn normalize(&self, records: &[Value], provider: ProviderKind) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        for (index, record) in records.iter().enumerate() {
            let raw = match provider {
                ProviderKind::Google => self.read_google(record),
                ProviderKind::Microsoft => self.read_microsoft(record),
                ProviderKind::Ical => self.read_ical(record),
            };
            let raw = match raw {
                Ok(raw) => raw,
                Err(reason) => {
                    let error = NormalizationError {
                        record_index: index,
                        event_id: record_id(record),
                        reason,
                    };
                    tracing::warn!(calendar_id = %self.calendar_id, %error, "skipping calendar record");
                    batch.skipped.push(error);
                    continue;
                }
            };

            if raw.status == EventStatus::Cancelled || raw.declined {
                batch.dropped += 1;
                continue;
            }

            match self.instances(&raw) {
                Ok(events) => batch.events.extend(events),
                Err(reason) => {
                    let error = NormalizationError {
                        record_index: index,
                        event_id: Some(raw.id.clone()),
                        reason,
                    };
                    tracing::warn!(calendar_id = %self.calendar_id, %error, "skipping calendar record");
                    batch.skipped.push(error);
                }
            }
        }

        batch.events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        batch
    }

    fn instances(&self, raw: &RawEvent) -> Result<Vec<CalendarEvent>, String> {
        let template = CalendarEvent {
            id: raw.id.clone(),
            calendar_id: self.calendar_id.clone(),
            start: raw.start,
            end: raw.end,
            status: raw.status,
            recurrence_expanded: raw.pre_expanded,
            attendees: raw.attendees.clone(),
            transparency: raw.transparency,
        };

        if raw.recurrence.is_empty() {
            let in_window = raw.start < self.window_end && raw.end > self.window_start;
            return Ok(if in_window { vec![template] } else { Vec::new() });
        }

        let occurrences = expand_in_window(
            &raw.recurrence,
            raw.start,
            raw.end - raw.start,
            &raw.timezone,
            self.window_start,
            self.window_end,
            self.max_instances,
        )
        .map_err(|e| e.to_string())?;

        Ok(occurrences
            .into_iter()
            .map(|occ| CalendarEvent {
                // Same instance id shape Google uses: <series>_<utc basic>.
                id: format!("{}_{}", raw.id, occ.start.format("%Y%m%dT%H%M%SZ")),
                start: occ.start,
                end: occ.end,
                recurrence_expanded: true,
                ..template.clone()
            })
            .collect())
    }

    fn read_google(&self, record: &Value) -> Result<RawEvent, String> {
        let ev: GoogleEvent =
            serde_json::from_value(record.clone()).map_err(|e| format!("malformed Google event: {}", e))?;
        let timezone = ev
            .start
            .time_zone
            .clone()
            .unwrap_or_else(|| "UTC".to_string());
        let start = self.google_time(&ev.start, &timezone, "start")?;
        let end = self.google_time(&ev.end, &timezone, "end")?;
        check_range(start, end)?;

        let status = match ev.status.as_deref() {
            Some("cancelled") => EventStatus::Cancelled,
            Some("tentative") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        };
        let transparency = match ev.transparency.as_deref() {
            Some("transparent") => Transparency::Free,
            _ => Transparency::Busy,
        };
        let declined = ev
            .attendees
            .iter()
            .any(|a| a.is_self && a.response_status.as_deref() == Some("declined"));

        Ok(RawEvent {
            id: ev.id,
            start,
            end,
            timezone,
            status,
            transparency,
            attendees: ev.attendees.into_iter().filter_map(|a| a.email).collect(),
            recurrence: ev.recurrence,
            declined,
            pre_expanded: ev.recurring_event_id.is_some(),
        })
    }

    fn google_time(&self, time: &GoogleTime, default_tz: &str, field: &str) -> Result<DateTime<Utc>, String> {
        if let Some(dt) = &time.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| format!("unparseable {} dateTime '{}': {}", field, dt, e));
        }
        if let Some(date) = &time.date {
            let tz = parse_tz(time.time_zone.as_deref().unwrap_or(default_tz))?;
            return self.local_midnight(date, &tz, field);
        }
        Err(format!("missing {} time", field))
    }

    fn read_microsoft(&self, record: &Value) -> Result<RawEvent, String> {
        let ev: GraphEvent = serde_json::from_value(record.clone())
            .map_err(|e| format!("malformed Microsoft Graph event: {}", e))?;
        if ev.event_type.as_deref() == Some("seriesMaster") {
            return Err("series master without expanded occurrences; query calendarView".to_string());
        }
        let start = self.graph_time(&ev.start, "start")?;
        let end = self.graph_time(&ev.end, "end")?;
        check_range(start, end)?;

        let status = if ev.is_cancelled {
            EventStatus::Cancelled
        } else if ev.show_as.as_deref() == Some("tentative") {
            EventStatus::Tentative
        } else {
            EventStatus::Confirmed
        };
        let transparency = match ev.show_as.as_deref() {
            Some("free") | Some("workingElsewhere") => Transparency::Free,
            _ => Transparency::Busy,
        };
        let declined = ev
            .response_status
            .as_ref()
            .and_then(|r| r.response.as_deref())
            == Some("declined");

        Ok(RawEvent {
            id: ev.id,
            start,
            end,
            timezone: windows_to_iana(&ev.start.time_zone).unwrap_or("UTC").to_string(),
            status,
            transparency,
            attendees: ev
                .attendees
                .into_iter()
                .filter_map(|a| a.email_address.and_then(|e| e.address))
                .collect(),
            recurrence: Vec::new(),
            declined,
            pre_expanded: matches!(ev.event_type.as_deref(), Some("occurrence") | Some("exception")),
        })
    }

    fn graph_time(&self, time: &GraphTime, field: &str) -> Result<DateTime<Utc>, String> {
        let iana = windows_to_iana(&time.time_zone)
            .ok_or_else(|| format!("unknown {} timeZone '{}'", field, time.time_zone))?;
        let tz = parse_tz(iana)?;
        let naive = NaiveDateTime::parse_from_str(&time.date_time, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| format!("unparseable {} dateTime '{}': {}", field, time.date_time, e))?;
        self.dst_policy
            .resolve(&tz, naive)
            .ok_or_else(|| format!("{} time {} falls in a DST gap", field, time.date_time))
    }

    fn read_ical(&self, record: &Value) -> Result<RawEvent, String> {
        let ev: IcalEvent =
            serde_json::from_value(record.clone()).map_err(|e| format!("malformed iCalendar event: {}", e))?;
        let timezone = ev.tzid.clone().unwrap_or_else(|| "UTC".to_string());
        let tz = parse_tz(&timezone)?;
        let start = self.ical_time(&ev.dtstart, &tz, "dtstart")?;
        let end = match (&ev.dtend, ev.duration_minutes) {
            (Some(dtend), _) => self.ical_time(dtend, &tz, "dtend")?,
            (None, Some(minutes)) => start + Duration::minutes(minutes as i64),
            (None, None) => return Err("missing dtend and duration".to_string()),
        };
        check_range(start, end)?;

        let status = match ev.status.as_deref().map(str::to_uppercase).as_deref() {
            Some("CANCELLED") => EventStatus::Cancelled,
            Some("TENTATIVE") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        };
        let transparency = match ev.transp.as_deref().map(str::to_uppercase).as_deref() {
            Some("TRANSPARENT") => Transparency::Free,
            _ => Transparency::Busy,
        };

        let mut recurrence = Vec::new();
        if let Some(rule) = &ev.rrule {
            recurrence.push(format!("RRULE:{}", rule.trim_start_matches("RRULE:")));
            if !ev.exdate.is_empty() {
                let exdates: Vec<String> =
                    ev.exdate.iter().map(|d| d.replace(['-', ':'], "")).collect();
                recurrence.push(format!("EXDATE;TZID={}:{}", timezone, exdates.join(",")));
            }
        }

        Ok(RawEvent {
            id: ev.uid,
            start,
            end,
            timezone,
            status,
            transparency,
            attendees: ev
                .attendees
                .into_iter()
                .map(|a| a.trim_start_matches("mailto:").to_string())
                .collect(),
            recurrence,
            declined: ev.partstat.as_deref().map(str::to_uppercase).as_deref() == Some("DECLINED"),
            pre_expanded: ev.recurrence_id.is_some(),
        })
    }

    /// iCalendar date-times: basic (`20260316T090000[Z]`), extended
    /// (`2026-03-16T09:00:00`), RFC 3339, or a bare date (all-day).
    fn ical_time(&self, value: &str, tz: &Tz, field: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(dt.with_timezone(&Utc));
        }
        if let Some(basic) = value.strip_suffix('Z') {
            if let Ok(naive) = NaiveDateTime::parse_from_str(basic, "%Y%m%dT%H%M%S") {
                return Ok(naive.and_utc());
            }
        }
        for format in ["%Y%m%dT%H%M%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return self
                    .dst_policy
                    .resolve(tz, naive)
                    .ok_or_else(|| format!("{} {} falls in a DST gap", field, value));
            }
        }
        self.local_midnight(value, tz, field)
    }

    fn local_midnight(&self, date: &str, tz: &Tz, field: &str) -> Result<DateTime<Utc>, String> {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(date, "%Y%m%d"))
            .map_err(|e| format!("unparseable {} '{}': {}", field, date, e))?;
        let midnight = day.and_hms_opt(0, 0, 0).ok_or_else(|| format!("invalid {} date", field))?;
        self.dst_policy
            .resolve(tz, midnight)
            .ok_or_else(|| format!("{} midnight falls in a DST gap", field))
    }
}

// ── Provider records ────────────────────────────────────────────────────────

/// Provider-independent intermediate form.
struct RawEvent {
    id: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    timezone: String,
    status: EventStatus,
    transparency: Transparency,
    attendees: Vec<String>,
    recurrence: Vec<String>,
    declined: bool,
    pre_expanded: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    status: Option<String>,
    start: GoogleTime,
    end: GoogleTime,
    transparency: Option<String>,
    #[serde(default)]
    recurrence: Vec<String>,
    recurring_event_id: Option<String>,
    #[serde(default)]
    attendees: Vec<GoogleAttendee>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTime {
    date_time: Option<String>,
    date: Option<String>,
    time_zone: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttendee {
    email: Option<String>,
    response_status: Option<String>,
    #[serde(rename = "self", default)]
    is_self: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvent {
    id: String,
    start: GraphTime,
    end: GraphTime,
    #[serde(default)]
    is_cancelled: bool,
    show_as: Option<String>,
    response_status: Option<GraphResponse>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    attendees: Vec<GraphAttendee>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphTime {
    date_time: String,
    time_zone: String,
}

#[derive(Deserialize)]
struct GraphResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttendee {
    email_address: Option<GraphEmail>,
}

#[derive(Deserialize)]
struct GraphEmail {
    address: Option<String>,
}

#[derive(Deserialize)]
struct IcalEvent {
    uid: String,
    dtstart: String,
    dtend: Option<String>,
    duration_minutes: Option<u32>,
    tzid: Option<String>,
    rrule: Option<String>,
    #[serde(default)]
    exdate: Vec<String>,
    recurrence_id: Option<String>,
    status: Option<String>,
    transp: Option<String>,
    partstat: Option<String>,
    #[serde(default)]
    attendees: Vec<String>,
}

fn record_id(record: &Value) -> Option<String> {
    ["id", "uid"]
        .iter()
        .find_map(|k| record.get(k).and_then(Value::as_str))
        .map(str::to_string)
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), String> {
    if start >= end {
        return Err(format!("event ends at or before it starts ({} >= {})", start, end));
    }
    Ok(())
}

fn parse_tz(name: &str) -> Result<Tz, String> {
    name.parse().map_err(|_| format!("unknown timezone '{}'", name))
}

/// Graph reports Windows zone names unless the `Prefer: outlook.timezone`
/// header asked for IANA. Map the common ones; pass IANA names through.
fn windows_to_iana(name: &str) -> Option<&str> {
    let mapped = match name {
        "UTC" | "Coordinated Universal Time" => "UTC",
        "Pacific Standard Time" => "America/Los_Angeles",
        "Mountain Standard Time" => "America/Denver",
        "Central Standard Time" => "America/Chicago",
        "Eastern Standard Time" => "America/New_York",
        "GMT Standard Time" => "Europe/London",
        "W. Europe Standard Time" => "Europe/Berlin",
        "Romance Standard Time" => "Europe/Paris",
        "India Standard Time" => "Asia/Kolkata",
        "Tokyo Standard Time" => "Asia/Tokyo",
        "AUS Eastern Standard Time" => "Australia/Sydney",
        other => return other.parse::<Tz>().ok().map(|_| other),
    };
    Some(mapped)
}
