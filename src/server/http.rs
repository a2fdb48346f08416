//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every route is
//! dispatched from `handle_request`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::auth::TokenAuthenticator;
use crate::config::Args;
use crate::lifecycle::LifecycleEngine;
use crate::routes::{self, to_boxed, BoxBody};
use crate::settings::SettingsStore;
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// The lifecycle engine every request route goes through
    pub engine: Arc<LifecycleEngine>,
    /// Bearer credential verifier
    pub authenticator: TokenAuthenticator,
    /// Per-principal settings documents
    pub settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(
        args: Args,
        engine: Arc<LifecycleEngine>,
        authenticator: TokenAuthenticator,
    ) -> Self {
        Self {
            args,
            engine,
            authenticator,
            settings: Arc::new(SettingsStore::new()),
        }
    }
}

/// Run the HTTP server until the listener fails
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Advice desk listening on {}", state.args.listen);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    if method == Method::OPTIONS {
        return Ok(to_boxed(preflight_response()));
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") => routes::health::handle_health(&state),

        (_, p) if p == "/advice-requests" || p.starts_with("/advice-requests/") => {
            routes::requests::handle_request_routes(req, Arc::clone(&state)).await
        }

        (_, "/settings") => routes::settings::handle_settings(req, Arc::clone(&state)).await,

        _ => to_boxed(not_found_response(&path)),
    };

    Ok(response)
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .header("Access-Control-Max-Age", "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "code": "NOT_FOUND",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
