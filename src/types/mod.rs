//! Shared types

pub mod error;

pub use error::{DeskError, Result};
