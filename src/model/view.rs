//! Response projections of request records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{AdviceRequest, RequestStatus, UserRecord};

/// Label used in history items when a request has no category
pub const NO_CATEGORY: &str = "none";

/// A request record decorated with display names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: RequestStatus,
    pub requester_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub advice_message: Option<String>,
    pub advice_provided_at: Option<DateTime<Utc>>,
}

impl RequestView {
    pub fn project(
        record: AdviceRequest,
        requester: Option<&UserRecord>,
        advisor: Option<&UserRecord>,
        category_name: Option<String>,
    ) -> Self {
        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            start_date: record.start_date,
            end_date: record.end_date,
            status: record.status,
            requester_id: record.requester_id,
            requester_name: requester.map(UserRecord::display_name),
            advisor_id: record.advisor_id,
            advisor_name: advisor.map(UserRecord::display_name),
            rejected_by: record.rejected_by,
            category_id: record.category_id,
            category_name,
            created_at: record.created_at,
            updated_at: record.updated_at,
            accepted_at: record.accepted_at,
            completed_at: record.completed_at,
            advice_message: record.advice_message,
            advice_provided_at: record.advice_provided_at,
        }
    }
}

/// Compact entry for a requester's profile history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub date: DateTime<Utc>,
    /// Category display name, or `"none"`
    pub category: String,
    pub description: String,
}

/// A client an advisor has worked with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedClient {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

impl From<&UserRecord> for AssignedClient {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.display_name(),
        }
    }
}
