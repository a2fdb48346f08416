//! Advice request routes
//!
//! Every route requires a bearer credential. The verified principal is passed
//! explicitly to the lifecycle engine, which owns all guards.
//!
//! Endpoints:
//! - POST /advice-requests                     - Open a request (client)
//! - GET  /advice-requests/pending             - Pending queue (advisor)
//! - GET  /advice-requests/my-requests         - Caller's own requests
//! - GET  /advice-requests/my-assignments      - Caller's assignments, `?status=`
//! - GET  /advice-requests/assigned-clients    - Clients the caller took on
//! - GET  /advice-requests/search              - Date window, name, status
//! - GET  /advice-requests/history/{requester} - Profile history
//! - GET  /advice-requests/{id}                - One request
//! - POST /advice-requests/{id}/{action}       - accept, reject, start, complete, cancel
//! - POST /advice-requests/{id}/advice         - Deliver advice and complete
//! - PUT  /advice-requests/{id}/category       - Set or clear the category

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use super::{
    error_response, get_auth_header, json_response, parse_json_body, parse_query, BoxBody,
    MessageResponse,
};
use crate::auth::Principal;
use crate::lifecycle::search::blank_as_none;
use crate::lifecycle::SearchFilter;
use crate::model::{NewAdviceRequest, RequestStatus};
use crate::server::AppState;
use crate::types::{DeskError, Result};

#[derive(Debug, Default, Deserialize)]
struct AssignmentParams {
    #[serde(default, deserialize_with = "blank_as_none")]
    status: Option<RequestStatus>,
}

#[derive(Debug, Deserialize)]
struct AdviceBody {
    #[serde(default)]
    advice: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryBody {
    #[serde(default)]
    category_id: Option<String>,
}

/// Handle everything under `/advice-requests`
pub async fn handle_request_routes(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let principal = match state.authenticator.verify_header(get_auth_header(&req)) {
        Ok(principal) => principal,
        Err(err) => return error_response(err),
    };

    match route(req, &state, &principal).await {
        Ok(response) => response,
        Err(err) => error_response(err),
    }
}

async fn route(
    req: Request<Incoming>,
    state: &AppState,
    principal: &Principal,
) -> Result<Response<BoxBody>> {
    let engine = &state.engine;
    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(1)
        .collect();

    match (method, segments.as_slice()) {
        (Method::POST, []) => {
            let input: NewAdviceRequest = parse_json_body(req).await?;
            let view = engine.create(principal, input).await?;
            Ok(json_response(StatusCode::CREATED, &view))
        }

        (Method::GET, ["pending"]) => {
            let views = engine.list_pending(principal).await?;
            Ok(json_response(StatusCode::OK, &views))
        }

        (Method::GET, ["my-requests"]) => {
            let views = engine.list_by_requester(principal, &principal.id).await?;
            Ok(json_response(StatusCode::OK, &views))
        }

        (Method::GET, ["my-assignments"]) => {
            let params: AssignmentParams = parse_query(&req)?;
            let views = engine
                .list_by_advisor(principal, &principal.id, params.status)
                .await?;
            Ok(json_response(StatusCode::OK, &views))
        }

        (Method::GET, ["assigned-clients"]) => {
            let clients = engine.assigned_clients(principal).await?;
            Ok(json_response(StatusCode::OK, &clients))
        }

        (Method::GET, ["search"]) => {
            let filter: SearchFilter = parse_query(&req)?;
            let views = engine.search(principal, &filter).await?;
            Ok(json_response(StatusCode::OK, &views))
        }

        (Method::GET, ["history", requester_id]) => {
            let items = engine.history_by_requester(requester_id).await?;
            Ok(json_response(StatusCode::OK, &items))
        }

        (Method::GET, [id]) => {
            let view = engine.get(principal, id).await?;
            Ok(json_response(StatusCode::OK, &view))
        }

        (Method::POST, [id, "accept"]) => {
            engine.accept(principal, id).await?;
            Ok(json_response(StatusCode::OK, &MessageResponse::new("Request accepted")))
        }

        (Method::POST, [id, "reject"]) => {
            engine.reject(principal, id).await?;
            Ok(json_response(StatusCode::OK, &MessageResponse::new("Request rejected")))
        }

        (Method::POST, [id, "start"]) => {
            engine.start(principal, id).await?;
            Ok(json_response(StatusCode::OK, &MessageResponse::new("Request started")))
        }

        (Method::POST, [id, "complete"]) => {
            engine.complete(principal, id).await?;
            Ok(json_response(StatusCode::OK, &MessageResponse::new("Request completed")))
        }

        (Method::POST, [id, "cancel"]) => {
            let view = engine.cancel(principal, id).await?;
            Ok(json_response(StatusCode::OK, &view))
        }

        (Method::POST, [id, "advice"]) => {
            let id = id.to_string();
            let body: AdviceBody = parse_json_body(req).await?;
            engine
                .provide_advice(principal, &id, body.advice.unwrap_or_default())
                .await?;
            Ok(json_response(StatusCode::OK, &MessageResponse::new("Advice provided")))
        }

        (Method::PUT, [id, "category"]) => {
            let id = id.to_string();
            let body: CategoryBody = parse_json_body(req).await?;
            let view = engine.reassign_category(principal, &id, body.category_id).await?;
            Ok(json_response(StatusCode::OK, &view))
        }

        (_, _) => Err(DeskError::NotFound(format!("No route for {}", path))),
    }
}
