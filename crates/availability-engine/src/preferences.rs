//! User scheduling preferences and the working-hours mask derived from them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::error::{EngineError, Result};

/// A recurring weekly working window in the user's local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Per-meeting-type defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingType {
    pub default_duration_minutes: u32,
    #[serde(default)]
    pub buffer_before_minutes: u32,
    #[serde(default)]
    pub buffer_after_minutes: u32,
    /// Days this meeting type may be scheduled on. Empty means any day.
    #[serde(default)]
    pub allowed_days: Vec<Weekday>,
}

impl MeetingType {
    pub fn buffers(&self) -> Buffers {
        Buffers {
            before: Duration::minutes(self.buffer_before_minutes as i64),
            after: Duration::minutes(self.buffer_after_minutes as i64),
        }
    }

    pub fn allows(&self, weekday: Weekday) -> bool {
        self.allowed_days.is_empty() || self.allowed_days.contains(&weekday)
    }
}

/// Required gaps around a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffers {
    pub before: Duration,
    pub after: Duration,
}

impl Buffers {
    pub fn none() -> Self {
        Self {
            before: Duration::zero(),
            after: Duration::zero(),
        }
    }

    pub fn total(&self) -> Duration {
        self.before + self.after
    }
}

/// A user-defined range excluded from scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blackout {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub label: Option<String>,
}

impl Blackout {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }

    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && end <= self.end
    }
}

/// One concrete working window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// `[start, end)` cut at each local midnight in `tz`, one window per local day.
pub fn daily_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tz: &Tz,
    policy: DstPolicy,
) -> Vec<MaskWindow> {
    if start >= end {
        return Vec::new();
    }
    let first_day = start.with_timezone(tz).date_naive();
    let mut windows = Vec::new();
    let mut cursor = start;
    for day in first_day.iter_days().skip(1) {
        let Some(midnight) = policy.resolve(tz, day.and_time(NaiveTime::MIN)) else {
            continue;
        };
        if midnight >= end {
            break;
        }
        if midnight > cursor {
            windows.push(MaskWindow {
                start: cursor,
                end: midnight,
            });
            cursor = midnight;
        }
    }
    windows.push(MaskWindow { start: cursor, end });
    windows
}

/// A user's scheduling preferences. Read-only during a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub user_id: String,
    /// IANA timezone the working hours are expressed in.
    pub timezone: String,
    #[serde(default)]
    pub working_hours: Vec<WorkingHours>,
    #[serde(default)]
    pub vip_contacts: BTreeSet<String>,
    #[serde(default)]
    pub meeting_types: BTreeMap<String, MeetingType>,
    #[serde(default)]
    pub blackouts: Vec<Blackout>,
}

impl Preferences {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| EngineError::InvalidTimezone(self.timezone.clone()))
    }

    /// Check structural invariants: valid timezone, ordered windows and
    /// blackouts, non-zero meeting durations.
    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        for wh in &self.working_hours {
            if wh.start >= wh.end {
                return Err(EngineError::InvalidInterval(format!(
                    "working hours on {} end before they start ({} >= {})",
                    wh.weekday, wh.start, wh.end
                )));
            }
        }
        for blackout in &self.blackouts {
            if blackout.start >= blackout.end {
                return Err(EngineError::InvalidInterval(format!(
                    "blackout {} ends before it starts",
                    blackout.label.as_deref().unwrap_or("<unnamed>")
                )));
            }
        }
        for (name, mt) in &self.meeting_types {
            if mt.default_duration_minutes == 0 {
                return Err(EngineError::InvalidRequest(format!(
                    "meeting type {} has a zero default duration",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Whether any of `participants` is on the VIP list (case-insensitive).
    pub fn has_vip<'a, I>(&self, participants: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        participants.into_iter().any(|p| {
            self.vip_contacts
                .iter()
                .any(|vip| vip.eq_ignore_ascii_case(p))
        })
    }

    pub fn meeting_type(&self, name: &str) -> Result<&MeetingType> {
        self.meeting_types
            .get(name)
            .ok_or_else(|| EngineError::UnknownMeetingType(name.to_string()))
    }

    /// Concrete working windows intersecting `[start, end)`, clipped to it,
    /// sorted and merged.
    pub fn working_mask(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        policy: DstPolicy,
    ) -> Result<Vec<MaskWindow>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let tz = self.tz()?;
        let first_day = start.with_timezone(&tz).date_naive();
        let last_day = end.with_timezone(&tz).date_naive();

        let mut mask = Vec::new();
        for day in first_day.iter_days().take_while(|d| *d <= last_day) {
            for wh in self.working_hours.iter().filter(|w| w.weekday == day.weekday()) {
                let (Some(ws), Some(we)) = (
                    policy.resolve(&tz, day.and_time(wh.start)),
                    policy.resolve(&tz, day.and_time(wh.end)),
                ) else {
                    continue;
                };
                let ws = ws.max(start);
                let we = we.min(end);
                if ws < we {
                    mask.push(MaskWindow { start: ws, end: we });
                }
            }
        }
        Ok(crate::freebusy::merge_mask(mask))
    }

    /// Mask used when working hours are not enforced: every local day of
    /// `[start, end)` is one window.
    pub fn day_mask(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        policy: DstPolicy,
    ) -> Result<Vec<MaskWindow>> {
        Ok(daily_windows(start, end, &self.tz()?, policy))
    }

    /// Whether `[start, end)` sits entirely inside one working window.
    pub fn within_working_hours(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        policy: DstPolicy,
    ) -> Result<bool> {
        let mask = self.working_mask(start, end, policy)?;
        Ok(mask.iter().any(|w| w.start <= start && w.end >= end))
    }

    /// First blackout overlapping `[start, end)`.
    pub fn blackout_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<&Blackout> {
        self.blackouts.iter().find(|b| b.overlaps(start, end))
    }
}
