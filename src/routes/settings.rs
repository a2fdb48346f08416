//! Settings routes
//!
//! - GET /settings - Effective settings for the caller
//! - PUT /settings - Merge a partial document into the caller's overrides

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use super::{error_response, get_auth_header, json_response, parse_json_body, BoxBody};
use crate::server::AppState;
use crate::settings::Settings;
use crate::types::{DeskError, Result};

pub async fn handle_settings(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    match settings(req, &state).await {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(err) => error_response(err),
    }
}

async fn settings(req: Request<Incoming>, state: &AppState) -> Result<Settings> {
    let claimed = state.authenticator.verify_header(get_auth_header(&req))?;
    let principal = state.engine.resolve(&claimed).await?;

    let method = req.method().clone();
    match method {
        Method::GET => Ok(state.settings.get(&principal.email)),
        Method::PUT => {
            let patch: Settings = parse_json_body(req).await?;
            Ok(state.settings.update(&principal.email, patch))
        }
        _ => Err(DeskError::BadRequest("Use GET or PUT on /settings".into())),
    }
}
