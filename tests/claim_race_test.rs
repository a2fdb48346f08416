//! Claim race tests
//!
//! Several advisors accept the same PENDING request at once. Exactly one
//! claim lands; every other caller sees an illegal transition and the winner
//! stays assigned.
//!
//! The store wrappers below force the interleavings that a plain in-memory
//! store never produces on its own: a rival write landing between the
//! engine's read and its conditional write, every contender reading the same
//! snapshot, and a writer that always gets there first.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

use advice_desk::auth::{Principal, Role};
use advice_desk::lifecycle::transition::apply;
use advice_desk::lifecycle::{Command, EngineConfig, Operation, RejectionMode};
use advice_desk::model::{AdviceRequest, Expected, RequestStatus};
use advice_desk::store::{
    CasOutcome, InMemoryDirectory, InMemoryRequestStore, RequestQuery, RequestStore,
};
use advice_desk::{DeskError, Result};

use common::{desk, engine_over, new_request, seed_user};

fn assert_lost_claim(err: DeskError, from: RequestStatus) {
    match err {
        DeskError::InvalidStateTransition { operation, from: status } => {
            assert_eq!(operation, Operation::Accept);
            assert_eq!(status, from);
        }
        other => panic!("expected InvalidStateTransition, got {:?}", other),
    }
}

// =============================================================================
// Store wrappers
// =============================================================================

/// Lands a competing claim just before the first conditional write
struct RivalClaimStore {
    inner: InMemoryRequestStore,
    rival: Principal,
    fired: AtomicBool,
}

#[async_trait]
impl RequestStore for RivalClaimStore {
    async fn insert(&self, record: AdviceRequest) -> Result<()> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<AdviceRequest>> {
        self.inner.get(id).await
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected: Expected,
        next: AdviceRequest,
    ) -> Result<CasOutcome> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            if let Some(current) = self.inner.get(id).await? {
                let mut claimed = current.clone();
                apply(
                    &Command::Accept,
                    &mut claimed,
                    &self.rival,
                    RejectionMode::Compat,
                    Utc::now(),
                )?;
                claimed.revision = current.revision + 1;
                self.inner
                    .compare_and_swap(id, current.expectation(), claimed)
                    .await?;
            }
        }
        self.inner.compare_and_swap(id, expected, next).await
    }

    async fn query(&self, query: &RequestQuery) -> Result<Vec<AdviceRequest>> {
        self.inner.query(query).await
    }
}

/// Holds every reader until all contenders have read the same snapshot
struct GatedStore {
    inner: InMemoryRequestStore,
    gate: Barrier,
    conflicts: AtomicUsize,
}

#[async_trait]
impl RequestStore for GatedStore {
    async fn insert(&self, record: AdviceRequest) -> Result<()> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<AdviceRequest>> {
        let record = self.inner.get(id).await?;
        self.gate.wait().await;
        Ok(record)
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected: Expected,
        next: AdviceRequest,
    ) -> Result<CasOutcome> {
        let outcome = self.inner.compare_and_swap(id, expected, next).await?;
        if matches!(outcome, CasOutcome::Conflict(_)) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn query(&self, query: &RequestQuery) -> Result<Vec<AdviceRequest>> {
        self.inner.query(query).await
    }
}

/// Every conditional write loses to a status-preserving writer
struct ChurningStore {
    inner: InMemoryRequestStore,
    attempts: AtomicUsize,
}

#[async_trait]
impl RequestStore for ChurningStore {
    async fn insert(&self, record: AdviceRequest) -> Result<()> {
        self.inner.insert(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<AdviceRequest>> {
        self.inner.get(id).await
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        _expected: Expected,
        _next: AdviceRequest,
    ) -> Result<CasOutcome> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let Some(current) = self.inner.get(id).await? else {
            return Ok(CasOutcome::Missing);
        };
        let mut touched = current.clone();
        touched.revision += 1;

        match self
            .inner
            .compare_and_swap(id, current.expectation(), touched)
            .await?
        {
            CasOutcome::Swapped(latest) => Ok(CasOutcome::Conflict(latest)),
            other => Ok(other),
        }
    }

    async fn query(&self, query: &RequestQuery) -> Result<Vec<AdviceRequest>> {
        self.inner.query(query).await
    }
}

// =============================================================================
// Forced interleavings
// =============================================================================

#[tokio::test]
async fn test_claim_lost_between_read_and_write() {
    let directory = Arc::new(InMemoryDirectory::new());
    let ana = seed_user(&directory, "ana", Role::Client);
    let luis = seed_user(&directory, "luis", Role::Advisor);
    let rival = seed_user(&directory, "rival", Role::Advisor);

    let store = Arc::new(RivalClaimStore {
        inner: InMemoryRequestStore::new(),
        rival,
        fired: AtomicBool::new(false),
    });
    let engine = engine_over(store.clone(), directory, EngineConfig::default());

    let id = engine.create(&ana, new_request("Contested")).await.unwrap().id;

    // luis read PENDING, but the rival's claim landed first
    assert_lost_claim(engine.accept(&luis, &id).await.unwrap_err(), RequestStatus::Accepted);

    let record = store.inner.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, RequestStatus::Accepted);
    assert_eq!(record.advisor_id.as_deref(), Some("rival"));
    assert_eq!(record.revision, 1);

    // A retry by the loser changes nothing
    assert_lost_claim(engine.accept(&luis, &id).await.unwrap_err(), RequestStatus::Accepted);
    let record = store.inner.get(&id).await.unwrap().unwrap();
    assert_eq!(record.advisor_id.as_deref(), Some("rival"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contenders_reading_same_snapshot_one_winner() {
    const ADVISORS: usize = 8;

    let directory = Arc::new(InMemoryDirectory::new());
    let ana = seed_user(&directory, "ana", Role::Client);
    let advisors: Vec<Principal> = (0..ADVISORS)
        .map(|i| seed_user(&directory, &format!("advisor-{}", i), Role::Advisor))
        .collect();

    let store = Arc::new(GatedStore {
        inner: InMemoryRequestStore::new(),
        gate: Barrier::new(ADVISORS),
        conflicts: AtomicUsize::new(0),
    });
    let engine = engine_over(store.clone(), directory, EngineConfig::default());

    let id = engine.create(&ana, new_request("Hot request")).await.unwrap().id;

    let mut handles = Vec::with_capacity(ADVISORS);
    for advisor in advisors {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let outcome = engine.accept(&advisor, &id).await;
            (advisor.id, outcome)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (advisor_id, outcome) = handle.await.unwrap();
        match outcome {
            Ok(()) => winners.push(advisor_id),
            Err(err) => assert_lost_claim(err, RequestStatus::Accepted),
        }
    }

    // Everyone read PENDING, so every loser went through a failed conditional write
    assert_eq!(winners.len(), 1);
    assert_eq!(store.conflicts.load(Ordering::SeqCst), ADVISORS - 1);

    let record = store.inner.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, RequestStatus::Accepted);
    assert_eq!(record.advisor_id.as_deref(), Some(winners[0].as_str()));
    assert_eq!(record.revision, 1);
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let directory = Arc::new(InMemoryDirectory::new());
    let ana = seed_user(&directory, "ana", Role::Client);
    let luis = seed_user(&directory, "luis", Role::Advisor);

    let store = Arc::new(ChurningStore {
        inner: InMemoryRequestStore::new(),
        attempts: AtomicUsize::new(0),
    });
    let engine = engine_over(
        store.clone(),
        directory,
        EngineConfig {
            max_conflict_retries: 2,
            ..EngineConfig::default()
        },
    );

    let id = engine.create(&ana, new_request("Busy")).await.unwrap().id;

    assert_lost_claim(engine.accept(&luis, &id).await.unwrap_err(), RequestStatus::Pending);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);

    let record = store.inner.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, RequestStatus::Pending);
    assert!(record.advisor_id.is_none());
    assert_eq!(record.revision, 3);
}

// =============================================================================
// Free-running contention
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_accepts_one_winner() {
    const ADVISORS: usize = 16;

    let desk = desk();
    let ana = desk.client("ana", "Ana", "Lopez");
    let advisors: Vec<Principal> = (0..ADVISORS)
        .map(|i| desk.advisor(&format!("advisor-{}", i), "Advisor", &i.to_string()))
        .collect();

    let id = desk.open(&ana, "Hot request").await;
    let barrier = Arc::new(Barrier::new(ADVISORS));

    let mut handles = Vec::with_capacity(ADVISORS);
    for advisor in advisors {
        let engine = Arc::clone(&desk.engine);
        let barrier = Arc::clone(&barrier);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let outcome = engine.accept(&advisor, &id).await;
            (advisor.id, outcome)
        }));
    }

    let mut winners = Vec::new();
    let mut losers = 0;
    for handle in handles {
        let (advisor_id, outcome) = handle.await.unwrap();
        match outcome {
            Ok(()) => winners.push(advisor_id),
            Err(DeskError::InvalidStateTransition { operation, from }) => {
                assert_eq!(operation, Operation::Accept);
                assert_eq!(from, RequestStatus::Accepted);
                losers += 1;
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one advisor should win the claim");
    assert_eq!(losers, ADVISORS - 1);

    let view = desk.engine.get(&ana, &id).await.unwrap();
    assert_eq!(view.status, RequestStatus::Accepted);
    assert_eq!(view.advisor_id.as_deref(), Some(winners[0].as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_requests_claimed_in_parallel() {
    let desk = desk();
    let ana = desk.client("ana", "Ana", "Lopez");

    let mut handles = Vec::new();
    for i in 0..8 {
        let advisor = desk.advisor(&format!("advisor-{}", i), "Advisor", &i.to_string());
        let id = desk.open(&ana, &format!("Request {}", i)).await;
        let engine = Arc::clone(&desk.engine);
        handles.push(tokio::spawn(async move {
            engine.accept(&advisor, &id).await.map(|_| (id, advisor.id))
        }));
    }

    for handle in handles {
        let (id, advisor_id) = handle.await.unwrap().unwrap();
        let view = desk.engine.get(&ana, &id).await.unwrap();
        assert_eq!(view.advisor_id.as_deref(), Some(advisor_id.as_str()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_races_accept_without_lost_update() {
    let desk = desk();
    let ana = desk.client("ana", "Ana", "Lopez");
    let luis = desk.advisor("luis", "Luis", "Perez");

    let id = desk.open(&ana, "Cancel or claim").await;

    let engine_a = Arc::clone(&desk.engine);
    let engine_b = Arc::clone(&desk.engine);
    let (id_a, id_b) = (id.clone(), id.clone());
    let owner = ana.clone();

    let cancel = tokio::spawn(async move { engine_a.cancel(&owner, &id_a).await.map(|_| ()) });
    let accept = tokio::spawn(async move { engine_b.accept(&luis, &id_b).await });

    let cancel = cancel.await.unwrap();
    let accept = accept.await.unwrap();

    // Cancel is legal from both PENDING and ACCEPTED, so it always lands
    assert!(cancel.is_ok());

    let view = desk.engine.get(&ana, &id).await.unwrap();
    assert_eq!(view.status, RequestStatus::Cancelled);
    match accept {
        Ok(()) => assert_eq!(view.advisor_id.as_deref(), Some("luis")),
        Err(err) => {
            assert!(matches!(err, DeskError::InvalidStateTransition { .. }));
            assert!(view.advisor_id.is_none());
        }
    }
}
