//! Collaborators the pipeline reads from: calendar providers and the
//! preferences store, plus in-memory implementations of both.

use std::collections::HashMap;

use async_trait::async_trait;
use availability_engine::{Preferences, ProviderKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CalendarFetchError;

/// A connected calendar and the record format its provider returns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarRef {
    pub calendar_id: String,
    pub provider: ProviderKind,
}

impl CalendarRef {
    pub fn new(calendar_id: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            provider,
        }
    }
}

/// Fetches provider-native event records for one calendar.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Records that may intersect `[window_start, window_end)`. Sources may
    /// return more; the normalizer clips.
    async fn fetch(
        &self,
        calendar: &CalendarRef,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Value>, CalendarFetchError>;
}

/// Read-only lookup of a user's scheduling preferences.
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Option<Preferences>;
}

/// Serves fixed records per calendar id.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendarSource {
    records: HashMap<String, Vec<Value>>,
    failures: HashMap<String, String>,
}

impl StaticCalendarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calendar(mut self, calendar_id: impl Into<String>, records: Vec<Value>) -> Self {
        self.records.insert(calendar_id.into(), records);
        self
    }

    /// Make every fetch of `calendar_id` fail with `reason`.
    pub fn with_failure(mut self, calendar_id: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.insert(calendar_id.into(), reason.into());
        self
    }
}

#[async_trait]
impl CalendarSource for StaticCalendarSource {
    async fn fetch(
        &self,
        calendar: &CalendarRef,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> Result<Vec<Value>, CalendarFetchError> {
        if let Some(reason) = self.failures.get(&calendar.calendar_id) {
            return Err(CalendarFetchError {
                calendar_id: calendar.calendar_id.clone(),
                reason: reason.clone(),
            });
        }
        self.records
            .get(&calendar.calendar_id)
            .cloned()
            .ok_or_else(|| CalendarFetchError {
                calendar_id: calendar.calendar_id.clone(),
                reason: "unknown calendar".to_string(),
            })
    }
}

/// Preferences keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferencesStore {
    users: HashMap<String, Preferences>,
}

impl StaticPreferencesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, preferences: Preferences) -> Self {
        self.users.insert(preferences.user_id.clone(), preferences);
        self
    }
}

#[async_trait]
impl PreferencesStore for StaticPreferencesStore {
    async fn get(&self, user_id: &str) -> Option<Preferences> {
        self.users.get(user_id).cloned()
    }
}
