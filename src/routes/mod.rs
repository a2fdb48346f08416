//! HTTP route handlers
//!
//! Shared response helpers live here; each submodule owns one resource.

pub mod health;
pub mod requests;
pub mod settings;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::types::DeskError;

/// Largest JSON body accepted by any route
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Error body: a human message plus a stable code
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

pub fn error_response(err: DeskError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::warn!("{} ({})", err, err.code());
    }
    json_response(
        status,
        &ErrorResponse {
            code: err.code(),
            error: err.to_string(),
        },
    )
}

pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
) -> Result<T, DeskError> {
    let bytes = read_limited(req.into_body(), MAX_BODY_BYTES).await?;
    serde_json::from_slice(&bytes).map_err(|e| DeskError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Collect a body, stopping as soon as it exceeds `limit` bytes
pub async fn read_limited<B>(body: B, limit: usize) -> Result<Bytes, DeskError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.is::<LengthLimitError>() {
            DeskError::BadRequest("Request body too large".into())
        } else {
            DeskError::BadRequest(format!("Failed to read body: {}", e))
        }
    })?;
    Ok(collected.to_bytes())
}

/// Decode the query string into `T`; a missing query is an empty one
pub fn parse_query<T: for<'de> Deserialize<'de>>(req: &Request<Incoming>) -> Result<T, DeskError> {
    serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
        .map_err(|e| DeskError::BadRequest(format!("Invalid query: {}", e)))
}

pub fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Operation;
    use crate::model::RequestStatus;

    #[test]
    fn test_error_response_carries_status() {
        let response = error_response(DeskError::invalid_transition(
            Operation::Accept,
            RequestStatus::Accepted,
        ));
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = error_response(DeskError::Authentication("Token expired".into()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_read_limited_stops_oversized_body() {
        let body = Full::new(Bytes::from(vec![b'a'; MAX_BODY_BYTES + 1]));
        match read_limited(body, MAX_BODY_BYTES).await {
            Err(DeskError::BadRequest(msg)) => assert_eq!(msg, "Request body too large"),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_limited_passes_body_at_limit() {
        let body = Full::new(Bytes::from(vec![b'a'; MAX_BODY_BYTES]));
        let bytes = read_limited(body, MAX_BODY_BYTES).await.unwrap();
        assert_eq!(bytes.len(), MAX_BODY_BYTES);

        let bytes = read_limited(Full::new(Bytes::from_static(b"{}")), MAX_BODY_BYTES)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"{}");
    }

    #[test]
    fn test_json_response_headers() {
        let response = json_response(StatusCode::CREATED, &MessageResponse::new("ok"));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }
}
