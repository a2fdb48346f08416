//! Transition guards and effects
//!
//! `apply` is pure: it checks one command against a record and a resolved
//! caller, and mutates the record in place when every guard passes. The
//! engine runs it against a copy and persists the copy conditionally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::auth::{Principal, Role};
use crate::model::{AdviceRequest, RequestStatus};
use crate::types::{DeskError, Result};

/// Engine operations, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Accept,
    Reject,
    Start,
    Complete,
    ProvideAdvice,
    Cancel,
    ReassignCategory,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Accept => "accept",
            Operation::Reject => "reject",
            Operation::Start => "start",
            Operation::Complete => "complete",
            Operation::ProvideAdvice => "provide advice for",
            Operation::Cancel => "cancel",
            Operation::ReassignCategory => "reassign the category of",
        };
        f.write_str(name)
    }
}

/// How an advisor's rejection of a pending request is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionMode {
    /// CANCELLED with the rejecting advisor stored as `advisor_id`
    #[default]
    Compat,
    /// REJECTED, `advisor_id` left unset
    Distinct,
}

impl FromStr for RejectionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compat" => Ok(RejectionMode::Compat),
            "distinct" => Ok(RejectionMode::Distinct),
            other => Err(format!(
                "unknown rejection mode '{}' (expected compat or distinct)",
                other
            )),
        }
    }
}

impl fmt::Display for RejectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionMode::Compat => write!(f, "compat"),
            RejectionMode::Distinct => write!(f, "distinct"),
        }
    }
}

/// A mutating command against an existing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Accept,
    Reject,
    Start,
    Complete,
    ProvideAdvice(String),
    Cancel,
    ReassignCategory(Option<String>),
}

impl Command {
    pub fn operation(&self) -> Operation {
        match self {
            Command::Accept => Operation::Accept,
            Command::Reject => Operation::Reject,
            Command::Start => Operation::Start,
            Command::Complete => Operation::Complete,
            Command::ProvideAdvice(_) => Operation::ProvideAdvice,
            Command::Cancel => Operation::Cancel,
            Command::ReassignCategory(_) => Operation::ReassignCategory,
        }
    }

    /// Input checks that do not depend on the stored record
    pub fn validate(&self) -> Result<()> {
        if let Command::ProvideAdvice(text) = self {
            if text.trim().is_empty() {
                return Err(DeskError::Validation("Advice text must not be empty".into()));
            }
        }
        Ok(())
    }
}

fn require_role(caller: &Principal, role: Role, operation: Operation) -> Result<()> {
    if caller.role == role {
        Ok(())
    } else {
        Err(DeskError::Authorization(format!(
            "Only {} principals may {} a request",
            role, operation
        )))
    }
}

fn require_assignee(record: &AdviceRequest, caller: &Principal, operation: Operation) -> Result<()> {
    require_role(caller, Role::Advisor, operation)?;
    if record.is_assigned_to(&caller.id) {
        Ok(())
    } else {
        Err(DeskError::Authorization(format!(
            "Only the assigned advisor may {} this request",
            operation
        )))
    }
}

fn require_status(record: &AdviceRequest, allowed: &[RequestStatus], operation: Operation) -> Result<()> {
    if allowed.contains(&record.status) {
        Ok(())
    } else {
        Err(DeskError::invalid_transition(operation, record.status))
    }
}

/// Check `command` against `record` for `caller` and apply its effects.
///
/// Guard order: terminal status, input validation, role and ownership, then the edge.
/// On error the record is left untouched.
pub fn apply(
    command: &Command,
    record: &mut AdviceRequest,
    caller: &Principal,
    rejection: RejectionMode,
    now: DateTime<Utc>,
) -> Result<()> {
    let operation = command.operation();
    let from = record.status;

    if from.is_terminal() {
        return Err(DeskError::invalid_transition(operation, from));
    }

    command.validate()?;

    match command {
        Command::Accept => {
            require_role(caller, Role::Advisor, operation)?;
            require_status(record, &[RequestStatus::Pending], operation)?;
            record.status = RequestStatus::Accepted;
            record.advisor_id = Some(caller.id.clone());
            record.accepted_at.get_or_insert(now);
        }
        Command::Reject => {
            require_role(caller, Role::Advisor, operation)?;
            require_status(record, &[RequestStatus::Pending], operation)?;
            record.rejected_by = Some(caller.id.clone());
            match rejection {
                RejectionMode::Compat => {
                    record.status = RequestStatus::Cancelled;
                    record.advisor_id = Some(caller.id.clone());
                }
                RejectionMode::Distinct => {
                    record.status = RequestStatus::Rejected;
                }
            }
        }
        Command::Start => {
            require_assignee(record, caller, operation)?;
            require_status(record, &[RequestStatus::Accepted], operation)?;
            record.status = RequestStatus::InProgress;
        }
        Command::Complete => {
            require_assignee(record, caller, operation)?;
            require_status(record, &[RequestStatus::InProgress], operation)?;
            record.status = RequestStatus::Completed;
            record.completed_at.get_or_insert(now);
        }
        Command::ProvideAdvice(text) => {
            require_assignee(record, caller, operation)?;
            require_status(record, &[RequestStatus::InProgress], operation)?;
            record.status = RequestStatus::Completed;
            record.advice_message = Some(text.trim().to_string());
            record.advice_provided_at.get_or_insert(now);
            record.completed_at.get_or_insert(now);
        }
        Command::Cancel => {
            if !record.is_owned_by(&caller.id) {
                return Err(DeskError::Authorization(
                    "Only the request owner can cancel the request".into(),
                ));
            }
            require_status(
                record,
                &[
                    RequestStatus::Pending,
                    RequestStatus::Accepted,
                    RequestStatus::InProgress,
                ],
                operation,
            )?;
            record.status = RequestStatus::Cancelled;
        }
        Command::ReassignCategory(category_id) => {
            // Unassigned requests have nobody entitled to recategorize them
            let allowed = match record.advisor_id {
                Some(ref advisor_id) => caller.is_advisor() && *advisor_id == caller.id,
                None => false,
            };
            if !allowed {
                return Err(DeskError::Authorization(
                    "Only the assigned advisor may change the category".into(),
                ));
            }
            record.category_id = category_id.clone();
        }
    }

    debug_assert!(
        from.can_move_to(record.status),
        "{} moved a request from {} to {}",
        operation,
        from,
        record.status
    );
    record.updated_at = now;
    Ok(())
}
