//! Advice desk - client/advisor engagement lifecycle
//!
//! Clients open advice requests; advisors claim them from a shared pending
//! queue, work them, and deliver advice. Claiming is race-safe: when several
//! advisors accept the same request at once, exactly one wins.
//!
//! ## Layers
//!
//! - **Auth**: bearer credential verification into a `Principal`
//! - **Lifecycle**: the state machine, its guards, and the conditional writes
//! - **Store**: request records, the principal directory, category names
//! - **Server**: hyper HTTP front door over the lifecycle engine

pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod model;
pub mod routes;
pub mod server;
pub mod settings;
pub mod store;
pub mod types;

pub use config::Args;
pub use lifecycle::LifecycleEngine;
pub use server::{run, AppState};
pub use types::{DeskError, Result};
