//! Advice desk - client/advisor engagement lifecycle service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advice_desk::{
    auth::{Role, TokenAuthenticator, TokenInput},
    config::Args,
    model::UserRecord,
    server::{self, AppState},
    store::{
        CategoryLookup, InMemoryDirectory, InMemoryRequestStore, MongoClient, MongoDirectory,
        MongoRequestStore, PrincipalStore, RequestStore,
    },
    LifecycleEngine,
};

type Stores = (
    Arc<dyn RequestStore>,
    Arc<dyn PrincipalStore>,
    Arc<dyn CategoryLookup>,
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("advice_desk={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Advice Desk");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Rejection mode: {}", args.rejection_mode);
    info!("Store timeout: {}ms", args.store_timeout_ms);
    info!("Conflict retries: {}", args.max_conflict_retries);
    info!("======================================");

    let authenticator = args.authenticator()?;
    info!("Credential expiry: {}s", authenticator.expiry_seconds());

    let (requests, principals, categories): Stores = match args.mongodb_uri {
        Some(ref uri) => {
            let mongo = match MongoClient::new(uri, &args.mongodb_db).await {
                Ok(client) => {
                    info!("MongoDB connected successfully ({})", client.db_name());
                    client
                }
                Err(e) => {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            };
            let requests: Arc<dyn RequestStore> = Arc::new(MongoRequestStore::new(&mongo).await?);
            let directory = Arc::new(MongoDirectory::new(&mongo).await?);
            let principals: Arc<dyn PrincipalStore> = directory.clone();
            let categories: Arc<dyn CategoryLookup> = directory;
            (requests, principals, categories)
        }
        None => {
            info!("No MONGODB_URI set, using in-memory stores");
            let directory = Arc::new(InMemoryDirectory::new());
            seed_dev_directory(&directory, &authenticator)?;
            let requests: Arc<dyn RequestStore> = Arc::new(InMemoryRequestStore::new());
            let principals: Arc<dyn PrincipalStore> = directory.clone();
            let categories: Arc<dyn CategoryLookup> = directory;
            (requests, principals, categories)
        }
    };

    let engine = Arc::new(LifecycleEngine::new(
        requests,
        principals,
        categories,
        args.engine_config(),
    ));

    let state = Arc::new(AppState::new(args, engine, authenticator));
    server::run(state).await?;

    Ok(())
}

/// Demo principals and categories for local development
fn seed_dev_directory(
    directory: &InMemoryDirectory,
    authenticator: &TokenAuthenticator,
) -> anyhow::Result<()> {
    let users = [
        UserRecord::new("dev-client", "client@example.com", "Ana", "Lopez", Role::Client),
        UserRecord::new("dev-advisor", "advisor@example.com", "Luis", "Perez", Role::Advisor),
    ];

    directory.put_category("savings", "Savings");
    directory.put_category("investments", "Investments");
    directory.put_category("debt", "Debt");

    for user in users {
        let token = authenticator.issue(TokenInput {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
        })?;
        info!("Dev {} {} token: {}", user.role, user.email, token);
        directory.upsert_user(user);
    }

    Ok(())
}
