//! Authentication for the advice desk
//!
//! Provides:
//! - JWT credential issuance and verification
//! - The `Principal` produced per call from a verified credential

pub mod jwt;
pub mod principal;

pub use jwt::{extract_token_from_header, Claims, TokenAuthenticator, TokenInput};
pub use principal::{Principal, Role};
