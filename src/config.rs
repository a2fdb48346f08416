//! Configuration for the advice desk
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::TokenAuthenticator;
use crate::lifecycle::{EngineConfig, RejectionMode};
use crate::types::{DeskError, Result};

/// Advice desk - client/advisor engagement lifecycle service
#[derive(Parser, Debug, Clone)]
#[command(name = "advice-desk")]
#[command(about = "Advice request lifecycle service with race-safe advisor claiming")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory stores seeded with demo principals)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JWT secret for credential verification (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// MongoDB connection URI; in-memory stores are used when unset
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "advice_desk")]
    pub mongodb_db: String,

    /// Upper bound on a single store call in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Guard re-evaluations allowed after a lost conditional write
    #[arg(long, env = "MAX_CONFLICT_RETRIES", default_value = "3")]
    pub max_conflict_retries: u32,

    /// How advisor rejections are recorded: compat (CANCELLED) or distinct (REJECTED)
    #[arg(long, env = "REJECTION_MODE", default_value = "compat")]
    pub rejection_mode: RejectionMode,
}

impl Args {
    /// Build the credential verifier (dev secret allowed only in dev mode)
    pub fn authenticator(&self) -> Result<TokenAuthenticator> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => TokenAuthenticator::new(secret.clone(), self.jwt_expiry_seconds),
            (None, true) => Ok(TokenAuthenticator::new_dev()),
            (None, false) => Err(DeskError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            rejection_mode: self.rejection_mode,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            max_conflict_retries: self.max_conflict_retries,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret.is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.mongodb_uri.is_none() {
                return Err("MONGODB_URI is required in production mode".to_string());
            }
        }

        if self.store_timeout_ms == 0 {
            return Err("STORE_TIMEOUT_MS must be greater than zero".to_string());
        }

        Ok(())
    }
}
