//! Verified caller identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role held by a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Requesting party. Older credentials call this role `USER`.
    #[serde(alias = "USER")]
    Client,
    /// Counterpart who claims and works requests
    Advisor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "CLIENT"),
            Role::Advisor => write!(f, "ADVISOR"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLIENT" | "USER" => Ok(Role::Client),
            "ADVISOR" => Ok(Role::Advisor),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Identity and role attached to a single call.
///
/// Built fresh per call from a verified credential and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
        }
    }

    pub fn is_advisor(&self) -> bool {
        self.role == Role::Advisor
    }

    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }
}
