//! Access log for the credential API.
//!
//! One line per request with method, route, status and latency. Bodies and
//! headers are never recorded: they carry passwords and bearer tokens.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn, Instrument};

const UNLOGGED_PATHS: &[&str] = &["/health"];

pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    if UNLOGGED_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let span = tracing::info_span!("request", %method, %path);

    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let status = response.status();
    span.in_scope(|| {
        if status.is_server_error() {
            warn!(status = status.as_u16(), elapsed_ms, "Request failed");
        } else {
            info!(status = status.as_u16(), elapsed_ms, "Request served");
        }
    });

    response
}
