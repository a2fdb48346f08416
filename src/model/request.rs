//! Advice request entity and its status graph

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Collection name for advice requests
pub const REQUEST_COLLECTION: &str = "advice_requests";

/// Lifecycle status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Waiting for an advisor to claim it
    Pending,
    /// Claimed by exactly one advisor
    Accepted,
    /// Advisor is working on it
    InProgress,
    Completed,
    Cancelled,
    /// Declined by an advisor while pending (distinct rejection mode only)
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Pending,
        RequestStatus::Accepted,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
        RequestStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Accepted => "ACCEPTED",
            RequestStatus::InProgress => "IN_PROGRESS",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Cancelled => "CANCELLED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    /// No mutating operation is defined on a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Rejected
        )
    }

    /// Statuses directly reachable from this one
    pub fn successors(&self) -> &'static [RequestStatus] {
        match self {
            RequestStatus::Pending => &[
                RequestStatus::Accepted,
                RequestStatus::Cancelled,
                RequestStatus::Rejected,
            ],
            RequestStatus::Accepted => &[RequestStatus::InProgress, RequestStatus::Cancelled],
            RequestStatus::InProgress => &[RequestStatus::Completed, RequestStatus::Cancelled],
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Rejected => &[],
        }
    }

    /// Whether a record may move from `self` to `next` in one write
    /// (staying put is allowed for status-preserving updates)
    pub fn can_move_to(&self, next: RequestStatus) -> bool {
        *self == next || self.successors().contains(&next)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| format!("unknown status: {}", s))
    }
}

/// Client-supplied content for a new request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdviceRequest {
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub category_id: Option<String>,
}

/// A request record as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceRequest {
    pub id: String,
    pub requester_id: String,
    /// Set once, on acceptance (or rejection in compat mode)
    pub advisor_id: Option<String>,
    /// Advisor who declined the request while it was pending
    #[serde(default)]
    pub rejected_by: Option<String>,

    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub category_id: Option<String>,

    pub status: RequestStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub advice_provided_at: Option<DateTime<Utc>>,

    pub advice_message: Option<String>,

    /// Bumped on every successful write; part of the conditional-update precondition
    #[serde(default)]
    pub revision: u64,
}

impl AdviceRequest {
    /// Build a fresh PENDING record owned by `requester_id`
    pub fn new(requester_id: impl Into<String>, input: NewAdviceRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requester_id: requester_id.into(),
            advisor_id: None,
            rejected_by: None,
            title: input.title,
            description: input.description,
            start_date: input.start_date,
            end_date: input.end_date,
            category_id: input.category_id,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            completed_at: None,
            advice_provided_at: None,
            advice_message: None,
            revision: 0,
        }
    }

    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.advisor_id.as_deref() == Some(user_id)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.requester_id == user_id
    }

    /// Precondition a conditional write against this record must match
    pub fn expectation(&self) -> Expected {
        Expected {
            status: self.status,
            revision: self.revision,
        }
    }
}

/// Expected prior state for a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub status: RequestStatus,
    pub revision: u64,
}

impl Expected {
    pub fn matches(&self, current: &AdviceRequest) -> bool {
        current.status == self.status && current.revision == self.revision
    }
}
