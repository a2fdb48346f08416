//! Search filters over request records

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt::Display;
use std::str::FromStr;

use crate::model::{AdviceRequest, RequestStatus};

/// Combinable optional filters; an empty filter matches everything
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// First creation day included
    #[serde(default, deserialize_with = "blank_as_none")]
    pub start_date: Option<NaiveDate>,
    /// Last creation day included, through end of day
    #[serde(default, deserialize_with = "blank_as_none")]
    pub end_date: Option<NaiveDate>,
    /// Case-insensitive substring of the requester's display name
    #[serde(default, deserialize_with = "blank_as_none")]
    pub requester_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<RequestStatus>,
}

/// Deserialize an optional value, treating an empty or blank string as absent.
///
/// Query strings built from untouched form fields send `startDate=` and the
/// like; those mean "no filter", not a malformed value.
pub fn blank_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn requester_name(mut self, needle: impl Into<String>) -> Self {
        self.requester_name = Some(needle.into());
        self
    }

    pub fn status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether `created_at` falls in `[start 00:00, end + 1 day 00:00)`
    pub fn matches_window(&self, created_at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start_date {
            if created_at < start_of_day(start) {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            // An end date at the calendar limit has no following day; nothing is later
            if let Some(next_day) = end.checked_add_days(Days::new(1)) {
                if created_at >= start_of_day(next_day) {
                    return false;
                }
            }
        }
        true
    }

    pub fn matches_status(&self, status: RequestStatus) -> bool {
        self.status.map_or(true, |wanted| wanted == status)
    }

    /// The trimmed, lowercased name needle, if any
    pub fn name_needle(&self) -> Option<String> {
        self.requester_name
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches_name(&self, display_name: Option<&str>) -> bool {
        match self.name_needle() {
            None => true,
            Some(needle) => display_name
                .map(|name| name.to_lowercase().contains(&needle))
                .unwrap_or(false),
        }
    }

    /// Checks that need no collaborator lookups
    pub fn matches_record(&self, record: &AdviceRequest) -> bool {
        self.matches_window(record.created_at) && self.matches_status(record.status)
    }
}
