//! In-memory stores
//!
//! `InMemoryRequestStore` keeps one `DashMap` slot per request id. A
//! conditional write holds that slot's shard lock for the compare and the
//! write, so writers to the same id serialize while other ids proceed.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{CasOutcome, CategoryLookup, PrincipalStore, RequestQuery, RequestStore};
use crate::model::{AdviceRequest, Expected, UserRecord};
use crate::types::{DeskError, Result};

/// Request records keyed by id
#[derive(Default)]
pub struct InMemoryRequestStore {
    records: DashMap<String, AdviceRequest>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, record: AdviceRequest) -> Result<()> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(DeskError::Internal(format!(
                "request {} already exists",
                record.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<AdviceRequest>> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected: Expected,
        next: AdviceRequest,
    ) -> Result<CasOutcome> {
        let Some(mut current) = self.records.get_mut(id) else {
            return Ok(CasOutcome::Missing);
        };

        if !expected.matches(current.value()) {
            debug!(
                "CAS mismatch on {}: expected {}@{}, found {}@{}",
                id, expected.status, expected.revision, current.status, current.revision
            );
            return Ok(CasOutcome::Conflict(current.value().clone()));
        }

        *current.value_mut() = next.clone();
        Ok(CasOutcome::Swapped(next))
    }

    async fn query(&self, query: &RequestQuery) -> Result<Vec<AdviceRequest>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }
}

/// Users and categories for dev mode and tests
#[derive(Default)]
pub struct InMemoryDirectory {
    users: DashMap<String, UserRecord>,
    categories: DashMap<String, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user (replacing models a role change)
    pub fn upsert_user(&self, user: UserRecord) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn remove_user(&self, id: &str) -> Option<UserRecord> {
        self.users.remove(id).map(|(_, user)| user)
    }

    pub fn put_category(&self, id: impl Into<String>, name: impl Into<String>) {
        self.categories.insert(id.into(), name.into());
    }
}

#[async_trait]
impl PrincipalStore for InMemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(email))
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl CategoryLookup for InMemoryDirectory {
    async fn category_name(&self, id: &str) -> Result<Option<String>> {
        Ok(self.categories.get(id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::model::{NewAdviceRequest, RequestStatus};
    use chrono::{NaiveDate, Utc};

    fn record(requester: &str) -> AdviceRequest {
        AdviceRequest::new(
            requester,
            NewAdviceRequest {
                title: "Savings plan".into(),
                description: "Where to start".into(),
                start_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
                category_id: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = InMemoryRequestStore::new();
        let r = record("client-1");

        store.insert(r.clone()).await.unwrap();
        assert!(store.insert(r).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cas_swaps_when_expectation_holds() {
        let store = InMemoryRequestStore::new();
        let r = record("client-1");
        store.insert(r.clone()).await.unwrap();

        let mut next = r.clone();
        next.status = RequestStatus::Accepted;
        next.revision = 1;

        match store.compare_and_swap(&r.id, r.expectation(), next).await.unwrap() {
            CasOutcome::Swapped(saved) => assert_eq!(saved.status, RequestStatus::Accepted),
            other => panic!("expected swap, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cas_reports_conflict_with_current_record() {
        let store = InMemoryRequestStore::new();
        let r = record("client-1");
        store.insert(r.clone()).await.unwrap();

        let mut first = r.clone();
        first.status = RequestStatus::Accepted;
        first.advisor_id = Some("advisor-a".into());
        first.revision = 1;
        store
            .compare_and_swap(&r.id, r.expectation(), first)
            .await
            .unwrap();

        let mut second = r.clone();
        second.status = RequestStatus::Accepted;
        second.advisor_id = Some("advisor-b".into());
        second.revision = 1;

        match store.compare_and_swap(&r.id, r.expectation(), second).await.unwrap() {
            CasOutcome::Conflict(current) => {
                assert_eq!(current.advisor_id.as_deref(), Some("advisor-a"));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cas_on_missing_id() {
        let store = InMemoryRequestStore::new();
        let r = record("client-1");

        let outcome = store
            .compare_and_swap(&r.id, r.expectation(), r.clone())
            .await
            .unwrap();
        assert!(matches!(outcome, CasOutcome::Missing));
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = InMemoryRequestStore::new();
        store.insert(record("client-1")).await.unwrap();
        store.insert(record("client-1")).await.unwrap();
        store.insert(record("client-2")).await.unwrap();

        let mine = store.query(&RequestQuery::by_requester("client-1")).await.unwrap();
        assert_eq!(mine.len(), 2);

        let pending = store
            .query(&RequestQuery::all().with_status(Some(RequestStatus::Pending)))
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);

        let assigned = store.query(&RequestQuery::by_advisor("nobody")).await.unwrap();
        assert!(assigned.is_empty());
    }

    #[tokio::test]
    async fn test_directory_email_lookup_ignores_case() {
        let directory = InMemoryDirectory::new();
        directory.upsert_user(UserRecord::new(
            "u1",
            "Ana.Lopez@Example.com",
            "Ana",
            "Lopez",
            Role::Client,
        ));

        let found = directory.find_by_email("ana.lopez@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some("u1".to_string()));
        assert!(directory.find_by_email("other@example.com").await.unwrap().is_none());
    }
}
