//! Request lifecycle engine
//!
//! Owns every guard on the request state machine and the claim race. Each
//! mutating call:
//!
//! 1. re-resolves the caller's current identity against the principal store
//! 2. loads the record and applies the command to a copy
//! 3. writes the copy with a conditional update keyed on (status, revision)
//!
//! A conditional write that loses re-evaluates the guards against the record
//! that won. A lost `accept` therefore fails with `InvalidStateTransition`,
//! since the winner moved the record out of PENDING. The engine holds no
//! locks of its own.

pub mod search;
pub mod transition;

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::{Principal, Role};
use crate::model::{
    AdviceRequest, AssignedClient, HistoryItem, NewAdviceRequest, RequestStatus, RequestView,
    UserRecord, NO_CATEGORY,
};
use crate::store::{CasOutcome, CategoryLookup, PrincipalStore, RequestQuery, RequestStore};
use crate::types::{DeskError, Result};

pub use search::SearchFilter;
pub use transition::{Command, Operation, RejectionMode};

/// Default bound on a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of guard re-evaluations after a lost conditional write
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rejection_mode: RejectionMode,
    pub store_timeout: Duration,
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rejection_mode: RejectionMode::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

/// The advice request lifecycle engine
pub struct LifecycleEngine {
    requests: Arc<dyn RequestStore>,
    principals: Arc<dyn PrincipalStore>,
    categories: Arc<dyn CategoryLookup>,
    config: EngineConfig,
}

impl LifecycleEngine {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        principals: Arc<dyn PrincipalStore>,
        categories: Arc<dyn CategoryLookup>,
        config: EngineConfig,
    ) -> Self {
        Self {
            requests,
            principals,
            categories,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a store call under the configured timeout
    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_transient() {
                    warn!("{} failed: {}", what, err);
                }
                Err(err)
            }
            Err(_) => {
                warn!("{} timed out after {:?}", what, self.config.store_timeout);
                Err(DeskError::TransientStore(format!(
                    "{} timed out after {}ms",
                    what,
                    self.config.store_timeout.as_millis()
                )))
            }
        }
    }

    /// Re-resolve a claimed principal against the directory.
    ///
    /// The returned principal carries the *current* role; credentials for
    /// principals that no longer exist are refused.
    pub async fn resolve(&self, claimed: &Principal) -> Result<Principal> {
        let user = self
            .bounded("principal lookup", self.principals.find_by_email(&claimed.email))
            .await?
            .ok_or_else(|| DeskError::Authentication("Principal no longer exists".into()))?;

        if user.id != claimed.id {
            return Err(DeskError::Authentication(
                "Credential does not match the current principal".into(),
            ));
        }

        if user.role != claimed.role {
            debug!(
                "Role of {} changed since issuance ({} -> {})",
                user.id, claimed.role, user.role
            );
        }

        Ok(user.to_principal())
    }

    async fn load(&self, id: &str) -> Result<AdviceRequest> {
        self.bounded("request load", self.requests.get(id))
            .await?
            .ok_or_else(|| DeskError::NotFound(format!("Request {} not found", id)))
    }

    async fn query(&self, query: &RequestQuery) -> Result<Vec<AdviceRequest>> {
        self.bounded("request query", self.requests.query(query)).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a PENDING request owned by the caller
    pub async fn create(&self, claimed: &Principal, input: NewAdviceRequest) -> Result<RequestView> {
        let caller = self.resolve(claimed).await?;

        if !caller.is_client() {
            return Err(DeskError::Authorization(format!(
                "Only {} principals may create a request",
                Role::Client
            )));
        }

        if input.title.trim().is_empty() {
            return Err(DeskError::Validation("Title must not be empty".into()));
        }

        let record = AdviceRequest::new(caller.id.clone(), input, Utc::now());
        self.bounded("request insert", self.requests.insert(record.clone()))
            .await?;

        info!("Request {} created by {}", record.id, caller.id);
        self.decorator().view(record).await
    }

    /// Apply `command` to request `id`, retrying guard evaluation on lost writes
    async fn transition(
        &self,
        claimed: &Principal,
        id: &str,
        command: Command,
    ) -> Result<AdviceRequest> {
        let caller = self.resolve(claimed).await?;
        let operation = command.operation();

        let mut current = self.load(id).await?;
        let mut conflicts = 0;

        loop {
            let mut next = current.clone();
            transition::apply(
                &command,
                &mut next,
                &caller,
                self.config.rejection_mode,
                Utc::now(),
            )?;
            next.revision = current.revision + 1;

            let outcome = self
                .bounded(
                    "conditional write",
                    self.requests
                        .compare_and_swap(id, current.expectation(), next),
                )
                .await?;

            match outcome {
                CasOutcome::Swapped(saved) => {
                    info!(
                        "Request {}: {} by {} ({} -> {})",
                        id, operation, caller.id, current.status, saved.status
                    );
                    return Ok(saved);
                }
                CasOutcome::Missing => {
                    return Err(DeskError::NotFound(format!("Request {} not found", id)));
                }
                CasOutcome::Conflict(latest) => {
                    conflicts += 1;
                    if conflicts > self.config.max_conflict_retries {
                        warn!(
                            "Request {}: giving up on {} after {} conflicting writes",
                            id, operation, conflicts
                        );
                        return Err(DeskError::invalid_transition(operation, latest.status));
                    }
                    debug!(
                        "Request {}: {} lost a conditional write (now {}@{}), re-evaluating",
                        id, operation, latest.status, latest.revision
                    );
                    current = latest;
                }
            }
        }
    }

    /// Claim a PENDING request. At most one advisor wins per request.
    pub async fn accept(&self, principal: &Principal, id: &str) -> Result<()> {
        self.transition(principal, id, Command::Accept).await.map(|_| ())
    }

    pub async fn reject(&self, principal: &Principal, id: &str) -> Result<()> {
        self.transition(principal, id, Command::Reject).await.map(|_| ())
    }

    pub async fn start(&self, principal: &Principal, id: &str) -> Result<()> {
        self.transition(principal, id, Command::Start).await.map(|_| ())
    }

    pub async fn complete(&self, principal: &Principal, id: &str) -> Result<()> {
        self.transition(principal, id, Command::Complete).await.map(|_| ())
    }

    /// Complete an IN_PROGRESS request with the advisor's final advice
    pub async fn provide_advice(
        &self,
        principal: &Principal,
        id: &str,
        advice: impl Into<String>,
    ) -> Result<()> {
        self.transition(principal, id, Command::ProvideAdvice(advice.into()))
            .await
            .map(|_| ())
    }

    pub async fn cancel(&self, principal: &Principal, id: &str) -> Result<RequestView> {
        let saved = self.transition(principal, id, Command::Cancel).await?;
        self.decorator().view(saved).await
    }

    /// Set or clear the category; status is unchanged
    pub async fn reassign_category(
        &self,
        principal: &Principal,
        id: &str,
        category_id: Option<String>,
    ) -> Result<RequestView> {
        let saved = self
            .transition(principal, id, Command::ReassignCategory(category_id))
            .await?;
        self.decorator().view(saved).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A single request, visible to its owner and to advisors
    pub async fn get(&self, principal: &Principal, id: &str) -> Result<RequestView> {
        let caller = self.resolve(principal).await?;
        let record = self.load(id).await?;

        if !record.is_owned_by(&caller.id) && !caller.is_advisor() {
            return Err(DeskError::Authorization(
                "Only the owner or an advisor may view this request".into(),
            ));
        }

        self.decorator().view(record).await
    }

    /// The open PENDING queue, oldest first
    pub async fn list_pending(&self, principal: &Principal) -> Result<Vec<RequestView>> {
        let caller = self.resolve(principal).await?;
        require_advisor(&caller, "view the pending queue")?;

        let mut records = self
            .query(&RequestQuery::all().with_status(Some(RequestStatus::Pending)))
            .await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        self.decorator().views(records).await
    }

    /// Every request owned by `requester_id`, newest first
    pub async fn list_by_requester(
        &self,
        principal: &Principal,
        requester_id: &str,
    ) -> Result<Vec<RequestView>> {
        let caller = self.resolve(principal).await?;
        if caller.id != requester_id {
            return Err(DeskError::Authorization(
                "Requests can only be listed by their owner".into(),
            ));
        }

        let mut records = self.query(&RequestQuery::by_requester(requester_id)).await?;
        newest_first(&mut records);

        self.decorator().views(records).await
    }

    /// Requests ever assigned to `advisor_id`.
    ///
    /// Without a status filter this returns every assignment, not just the
    /// ACCEPTED ones.
    pub async fn list_by_advisor(
        &self,
        principal: &Principal,
        advisor_id: &str,
        status: Option<RequestStatus>,
    ) -> Result<Vec<RequestView>> {
        let caller = self.resolve(principal).await?;
        require_advisor(&caller, "view assignments")?;
        if caller.id != advisor_id {
            return Err(DeskError::Authorization(
                "Advisors can only list their own assignments".into(),
            ));
        }

        let mut records = self
            .query(&RequestQuery::by_advisor(advisor_id).with_status(status))
            .await?;
        newest_first(&mut records);

        self.decorator().views(records).await
    }

    /// Search by created-date window, requester name and status.
    ///
    /// Advisors search every request; clients only their own.
    pub async fn search(
        &self,
        principal: &Principal,
        filter: &SearchFilter,
    ) -> Result<Vec<RequestView>> {
        let caller = self.resolve(principal).await?;
        let scope = if caller.is_advisor() {
            RequestQuery::all()
        } else {
            RequestQuery::by_requester(caller.id.clone())
        };

        let mut decorator = self.decorator();
        let mut hits = Vec::new();
        for record in self.query(&scope).await? {
            if !filter.matches_record(&record) {
                continue;
            }
            let requester = decorator.user(&record.requester_id).await?;
            let name = requester.as_ref().map(UserRecord::display_name);
            if filter.matches_name(name.as_deref()) {
                hits.push(record);
            }
        }
        newest_first(&mut hits);

        debug!("Search by {} matched {} request(s)", caller.id, hits.len());
        decorator.views(hits).await
    }

    /// Profile history for a requester, newest first.
    ///
    /// Read-only and scoped only by the requester id.
    pub async fn history_by_requester(&self, requester_id: &str) -> Result<Vec<HistoryItem>> {
        let mut records = self.query(&RequestQuery::by_requester(requester_id)).await?;
        newest_first(&mut records);

        let mut decorator = self.decorator();
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let category = match record.category_id {
                Some(ref id) => decorator.category(id).await?,
                None => None,
            };
            items.push(HistoryItem {
                id: record.id,
                date: record.created_at,
                category: category.unwrap_or_else(|| NO_CATEGORY.to_string()),
                description: record.description,
            });
        }
        Ok(items)
    }

    /// Distinct clients whose requests the caller accepted
    pub async fn assigned_clients(&self, principal: &Principal) -> Result<Vec<AssignedClient>> {
        let caller = self.resolve(principal).await?;
        require_advisor(&caller, "view assigned clients")?;

        let records = self.query(&RequestQuery::by_advisor(caller.id.clone())).await?;

        let mut seen = HashSet::new();
        let mut decorator = self.decorator();
        let mut clients = Vec::new();
        for record in records {
            // Compat-mode rejections also carry advisor_id
            if record.rejected_by.as_deref() == Some(caller.id.as_str()) {
                continue;
            }
            if !seen.insert(record.requester_id.clone()) {
                continue;
            }
            if let Some(user) = decorator.user(&record.requester_id).await? {
                clients.push(AssignedClient::from(&user));
            }
        }
        clients.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(clients)
    }

    fn decorator(&self) -> Decorator<'_> {
        Decorator {
            engine: self,
            users: HashMap::new(),
            categories: HashMap::new(),
        }
    }
}

fn require_advisor(caller: &Principal, action: &str) -> Result<()> {
    if caller.is_advisor() {
        Ok(())
    } else {
        Err(DeskError::Authorization(format!(
            "Only {} principals may {}",
            Role::Advisor,
            action
        )))
    }
}

fn newest_first(records: &mut [AdviceRequest]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Per-call cache of collaborator lookups used to build views
struct Decorator<'a> {
    engine: &'a LifecycleEngine,
    users: HashMap<String, Option<UserRecord>>,
    categories: HashMap<String, Option<String>>,
}

impl Decorator<'_> {
    async fn user(&mut self, id: &str) -> Result<Option<UserRecord>> {
        if let Some(cached) = self.users.get(id) {
            return Ok(cached.clone());
        }
        let user = self
            .engine
            .bounded("principal lookup", self.engine.principals.find_by_id(id))
            .await?;
        self.users.insert(id.to_string(), user.clone());
        Ok(user)
    }

    async fn category(&mut self, id: &str) -> Result<Option<String>> {
        if let Some(cached) = self.categories.get(id) {
            return Ok(cached.clone());
        }
        let name = self
            .engine
            .bounded("category lookup", self.engine.categories.category_name(id))
            .await?;
        self.categories.insert(id.to_string(), name.clone());
        Ok(name)
    }

    async fn view(&mut self, record: AdviceRequest) -> Result<RequestView> {
        let requester = self.user(&record.requester_id).await?;
        let advisor = match record.advisor_id {
            Some(ref id) => self.user(id).await?,
            None => None,
        };
        let category = match record.category_id {
            Some(ref id) => self.category(id).await?,
            None => None,
        };
        Ok(RequestView::project(
            record,
            requester.as_ref(),
            advisor.as_ref(),
            category,
        ))
    }

    async fn views(&mut self, records: Vec<AdviceRequest>) -> Result<Vec<RequestView>> {
        let mut views = Vec::with_capacity(records.len());
        for record in records {
            views.push(self.view(record).await?);
        }
        Ok(views)
    }
}
