//! Bearer credential handling
//!
//! Credentials are HS256 (HMAC-SHA256) JWTs carrying the subject email, the
//! user id, the role at issuance, and the issue/expiry times.
//!
//! The embedded role is advisory: the lifecycle engine re-resolves the
//! principal against the directory before any role-gated guard.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::{Principal, Role};
use crate::types::{DeskError, Result};

/// Minimum accepted secret length outside dev mode
pub const MIN_SECRET_LEN: usize = 32;

/// Payload stored in the token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject email
    pub sub: String,
    /// Stable user id
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Role at issuance
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    fn into_principal(self) -> Principal {
        Principal::new(self.user_id, self.sub, self.role)
    }
}

/// Input for issuing a token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

/// Verifies bearer credentials and turns them into principals
#[derive(Clone)]
pub struct TokenAuthenticator {
    secret: String,
    expiry_seconds: u64,
}

impl TokenAuthenticator {
    /// Create a new authenticator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(DeskError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < MIN_SECRET_LEN {
            return Err(DeskError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create an authenticator for dev mode
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    pub fn expiry_seconds(&self) -> u64 {
        self.expiry_seconds
    }

    /// Issue a token for a known user
    pub fn issue(&self, input: TokenInput) -> Result<String> {
        let now = unix_now()?;

        let claims = Claims {
            sub: input.email,
            user_id: input.user_id,
            role: input.role,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| DeskError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify and decode a token into the principal it claims
    pub fn verify(&self, token: &str) -> Result<Principal> {
        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => Ok(data.claims.into_principal()),
            Err(err) => {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => "Malformed token",
                    _ => "Token validation failed",
                };
                Err(DeskError::Authentication(reason.into()))
            }
        }
    }

    /// Extract and verify the credential from an `Authorization` header value
    pub fn verify_header(&self, auth_header: Option<&str>) -> Result<Principal> {
        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| DeskError::Authentication("Missing bearer credential".into()))?;
        self.verify(token)
    }
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| DeskError::Internal(format!("System time error: {}", e)))
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}
