//! Error types for the advice desk
//!
//! Every engine operation returns one of these as a typed result. The HTTP
//! layer maps them onto status codes and a stable machine-readable code.

use hyper::StatusCode;

use crate::lifecycle::Operation;
use crate::model::RequestStatus;

/// Main error type for advice desk operations
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// Credential missing, malformed, expired, or badly signed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Valid principal, but role or relationship to the record fails a guard
    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not legal from the record's current status.
    ///
    /// A lost claim race surfaces as this variant too.
    #[error("Invalid state transition: cannot {operation} a request that is {from}")]
    InvalidStateTransition {
        operation: Operation,
        from: RequestStatus,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Store unavailable or timed out; the whole operation may be retried
    #[error("Store unavailable: {0}")]
    TransientStore(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeskError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for API consumers
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::Authorization(_) => "AUTHORIZATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::TransientStore(_) => "TRANSIENT_STORE_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the whole operation (with a fresh read) may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    pub(crate) fn invalid_transition(operation: Operation, from: RequestStatus) -> Self {
        Self::InvalidStateTransition { operation, from }
    }
}

impl From<std::io::Error> for DeskError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for advice desk operations
pub type Result<T> = std::result::Result<T, DeskError>;
