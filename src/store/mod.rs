//! Storage collaborators
//!
//! The engine only talks to these traits. Two implementations ship with the
//! crate: in-memory stores (`memory`) and MongoDB-backed stores (`mongo`).
//!
//! The one hard contract is `RequestStore::compare_and_swap`: it must
//! atomically compare the stored record against an expected status and
//! revision and write only on a match. Contention is scoped to one id.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;

use crate::model::{AdviceRequest, Expected, RequestStatus, UserRecord};
use crate::types::Result;

pub use memory::{InMemoryDirectory, InMemoryRequestStore};
pub use mongo::{MongoClient, MongoDirectory, MongoRequestStore};

/// Outcome of a conditional write
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The precondition held and the new record was written
    Swapped(AdviceRequest),
    /// Someone else wrote first; carries the record as currently stored
    Conflict(AdviceRequest),
    /// No record with that id
    Missing,
}

/// Equality filters for listing requests; `None` means "any"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    pub requester_id: Option<String>,
    pub advisor_id: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_requester(requester_id: impl Into<String>) -> Self {
        Self {
            requester_id: Some(requester_id.into()),
            ..Self::default()
        }
    }

    pub fn by_advisor(advisor_id: impl Into<String>) -> Self {
        Self {
            advisor_id: Some(advisor_id.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<RequestStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, record: &AdviceRequest) -> bool {
        self.requester_id
            .as_deref()
            .map_or(true, |id| record.requester_id == id)
            && self
                .advisor_id
                .as_deref()
                .map_or(true, |id| record.advisor_id.as_deref() == Some(id))
            && self.status.map_or(true, |status| record.status == status)
    }
}

/// Durable keyed storage for request records
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new record; fails if the id is already taken
    async fn insert(&self, record: AdviceRequest) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<AdviceRequest>>;

    /// Atomically replace the record at `id` with `next` if it still matches `expected`
    async fn compare_and_swap(
        &self,
        id: &str,
        expected: Expected,
        next: AdviceRequest,
    ) -> Result<CasOutcome>;

    /// List records matching every filter in `query` (unordered)
    async fn query(&self, query: &RequestQuery) -> Result<Vec<AdviceRequest>>;
}

/// Resolves the current identity record of a principal
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Case-insensitive lookup by email
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>>;
}

/// Resolves category ids to display names
#[async_trait]
pub trait CategoryLookup: Send + Sync {
    async fn category_name(&self, id: &str) -> Result<Option<String>>;
}
