//! Shared harness: an engine over in-memory stores with a seeded directory

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

use advice_desk::auth::{Principal, Role};
use advice_desk::lifecycle::EngineConfig;
use advice_desk::model::{AdviceRequest, NewAdviceRequest, UserRecord};
use advice_desk::store::{InMemoryDirectory, InMemoryRequestStore, RequestStore};
use advice_desk::LifecycleEngine;

pub struct Desk {
    pub engine: Arc<LifecycleEngine>,
    pub directory: Arc<InMemoryDirectory>,
    pub requests: Arc<InMemoryRequestStore>,
}

pub fn desk() -> Desk {
    desk_with(EngineConfig::default())
}

pub fn desk_with(config: EngineConfig) -> Desk {
    let directory = Arc::new(InMemoryDirectory::new());
    let requests = Arc::new(InMemoryRequestStore::new());
    directory.put_category("savings", "Savings");
    directory.put_category("debt", "Debt");

    let engine = Arc::new(LifecycleEngine::new(
        requests.clone(),
        directory.clone(),
        directory.clone(),
        config,
    ));

    Desk {
        engine,
        directory,
        requests,
    }
}

/// Engine over an arbitrary request store, sharing `directory`
pub fn engine_over(
    requests: Arc<dyn RequestStore>,
    directory: Arc<InMemoryDirectory>,
    config: EngineConfig,
) -> Arc<LifecycleEngine> {
    Arc::new(LifecycleEngine::new(
        requests,
        directory.clone(),
        directory,
        config,
    ))
}

/// Seed a directory user and return the principal it resolves to
pub fn seed_user(directory: &InMemoryDirectory, id: &str, role: Role) -> Principal {
    let user = UserRecord::new(id, format!("{}@example.com", id), id, "Tester", role);
    let principal = user.to_principal();
    directory.upsert_user(user);
    principal
}

impl Desk {
    fn principal(&self, id: &str, first: &str, last: &str, role: Role) -> Principal {
        let user = UserRecord::new(id, format!("{}@example.com", id), first, last, role);
        let principal = user.to_principal();
        self.directory.upsert_user(user);
        principal
    }

    pub fn client(&self, id: &str, first: &str, last: &str) -> Principal {
        self.principal(id, first, last, Role::Client)
    }

    pub fn advisor(&self, id: &str, first: &str, last: &str) -> Principal {
        self.principal(id, first, last, Role::Advisor)
    }

    /// Open a request through the engine and return its id
    pub async fn open(&self, client: &Principal, title: &str) -> String {
        self.engine
            .create(client, new_request(title))
            .await
            .expect("create should succeed")
            .id
    }

    /// Store a record with a fixed creation time, bypassing the engine
    pub async fn open_at(&self, client: &Principal, title: &str, created_at: DateTime<Utc>) -> String {
        let record = AdviceRequest::new(client.id.clone(), new_request(title), created_at);
        let id = record.id.clone();
        self.requests.insert(record).await.expect("insert should succeed");
        id
    }

    /// Walk a request to IN_PROGRESS under `advisor`
    pub async fn in_progress(&self, client: &Principal, advisor: &Principal, title: &str) -> String {
        let id = self.open(client, title).await;
        self.engine.accept(advisor, &id).await.expect("accept");
        self.engine.start(advisor, &id).await.expect("start");
        id
    }
}

pub fn new_request(title: &str) -> NewAdviceRequest {
    NewAdviceRequest {
        title: title.to_string(),
        description: format!("{} - details", title),
        start_date: date(2025, 1, 1),
        end_date: date(2025, 12, 31),
        category_id: None,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}
