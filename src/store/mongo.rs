//! MongoDB-backed stores
//!
//! The conditional write is a `replace_one` filtered on id, status and
//! revision; MongoDB applies a single-document replace atomically, so at most
//! one writer can match a given (status, revision) pair.

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{
    options::{Collation, CollationStrength, FindOneOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use super::{CasOutcome, CategoryLookup, PrincipalStore, RequestQuery, RequestStore};
use crate::model::{AdviceRequest, Expected, UserRecord, REQUEST_COLLECTION, USER_COLLECTION};
use crate::types::{DeskError, Result};

/// Collection name for category display names
pub const CATEGORY_COLLECTION: &str = "categories";

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping, failing fast when the server is unreachable
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| DeskError::TransientStore(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DeskError::TransientStore(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection with its schema indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<Collection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        let collection = self.client.database(&self.db_name).collection::<T>(name);
        apply_indexes(&collection).await?;
        Ok(collection)
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

async fn apply_indexes<T>(collection: &Collection<T>) -> Result<()>
where
    T: Send + Sync + IntoIndexes,
{
    let indices: Vec<IndexModel> = T::into_indices()
        .into_iter()
        .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
        .collect();

    if indices.is_empty() {
        return Ok(());
    }

    collection
        .create_indexes(indices)
        .await
        .map_err(|e| DeskError::TransientStore(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn named(name: &str) -> Option<IndexOptions> {
    Some(IndexOptions::builder().name(name.to_string()).build())
}

impl IntoIndexes for AdviceRequest {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("id_unique".to_string())
                        .build(),
                ),
            ),
            (doc! { "requester_id": 1, "created_at": -1 }, named("requester_index")),
            (doc! { "advisor_id": 1, "status": 1 }, named("advisor_status_index")),
            (doc! { "status": 1 }, named("status_index")),
        ]
    }
}

impl IntoIndexes for UserRecord {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("id_unique".to_string())
                        .build(),
                ),
            ),
            (doc! { "email": 1 }, named("email_index")),
        ]
    }
}

/// Category document; only the display name is read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDoc {
    pub id: String,
    pub name: String,
}

impl IntoIndexes for CategoryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(doc! { "id": 1 }, named("id_index"))]
    }
}

fn query_filter(query: &RequestQuery) -> Document {
    let mut filter = Document::new();
    if let Some(ref requester_id) = query.requester_id {
        filter.insert("requester_id", requester_id.as_str());
    }
    if let Some(ref advisor_id) = query.advisor_id {
        filter.insert("advisor_id", advisor_id.as_str());
    }
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    filter
}

/// Request records in MongoDB
#[derive(Clone)]
pub struct MongoRequestStore {
    requests: Collection<AdviceRequest>,
}

impl MongoRequestStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            requests: mongo.collection(REQUEST_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl RequestStore for MongoRequestStore {
    async fn insert(&self, record: AdviceRequest) -> Result<()> {
        self.requests
            .insert_one(&record)
            .await
            .map_err(|e| DeskError::TransientStore(format!("Insert failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<AdviceRequest>> {
        self.requests
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| DeskError::TransientStore(format!("Find failed: {}", e)))
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected: Expected,
        next: AdviceRequest,
    ) -> Result<CasOutcome> {
        let filter = doc! {
            "id": id,
            "status": expected.status.as_str(),
            "revision": expected.revision as i64,
        };

        let result = self
            .requests
            .replace_one(filter, &next)
            .await
            .map_err(|e| DeskError::TransientStore(format!("Conditional replace failed: {}", e)))?;

        if result.matched_count == 1 {
            return Ok(CasOutcome::Swapped(next));
        }

        debug!("Conditional replace on {} matched nothing, re-reading", id);
        Ok(match self.get(id).await? {
            Some(current) => CasOutcome::Conflict(current),
            None => CasOutcome::Missing,
        })
    }

    async fn query(&self, query: &RequestQuery) -> Result<Vec<AdviceRequest>> {
        let cursor = self
            .requests
            .find(query_filter(query))
            .await
            .map_err(|e| DeskError::TransientStore(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| DeskError::TransientStore(format!("Cursor failed: {}", e)))
    }
}

/// Users and categories in MongoDB
#[derive(Clone)]
pub struct MongoDirectory {
    users: Collection<UserRecord>,
    categories: Collection<CategoryDoc>,
}

impl MongoDirectory {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            users: mongo.collection(USER_COLLECTION).await?,
            categories: mongo.collection(CATEGORY_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl PrincipalStore for MongoDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        // Secondary strength compares case-insensitively
        let collation = Collation::builder()
            .locale("en".to_string())
            .strength(CollationStrength::Secondary)
            .build();
        let options = FindOneOptions::builder().collation(collation).build();

        self.users
            .find_one(doc! { "email": email })
            .with_options(options)
            .await
            .map_err(|e| DeskError::TransientStore(format!("User lookup failed: {}", e)))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        self.users
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| DeskError::TransientStore(format!("User lookup failed: {}", e)))
    }
}

#[async_trait]
impl CategoryLookup for MongoDirectory {
    async fn category_name(&self, id: &str) -> Result<Option<String>> {
        let category = self
            .categories
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| DeskError::TransientStore(format!("Category lookup failed: {}", e)))?;
        Ok(category.map(|c| c.name))
    }
}
