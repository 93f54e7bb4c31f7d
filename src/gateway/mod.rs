//! Axum-based HTTP/WebSocket surface for the conversational assessment core.
//!
//! HTTP carries the request/response operations (`initialize`,
//! `process_response`, `retry_last_ai`, `calculate_final_grade`); the
//! WebSocket route gives the same session a persistent channel so a client
//! can drive a whole conversation without re-establishing a connection per
//! turn. Both paths end up at the same [`SessionHandle`](crate::actor::SessionHandle),
//! so a turn submitted over HTTP and one submitted over the socket still
//! serialize through the one actor per session.

mod events;
mod handlers;
mod principal;
mod state;
mod websocket;

pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use axum::http::StatusCode;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::engine::ConversationalAssessmentEngine;
use crate::store::SessionStore;

/// Request bodies larger than this are rejected before they reach a handler.
pub const MAX_BODY_SIZE: usize = 65_536;
/// A request that hasn't completed within this long is aborted.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/sessions", post(handlers::handle_initialize))
        .route("/sessions/{id}/responses", post(handlers::handle_process_response))
        .route("/sessions/{id}/retry", post(handlers::handle_retry))
        .route("/sessions/{id}/grade", post(handlers::handle_grade))
        .route("/sessions/{id}/ws", get(websocket::ws_handler))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(REQUEST_TIMEOUT_SECS)))
}

/// Binds `host:port` and serves the gateway until the process is signalled to stop.
pub async fn run_gateway(
    host: &str,
    port: u16,
    engine: Arc<ConversationalAssessmentEngine>,
    store: Arc<dyn SessionStore>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = router(AppState::new(engine, store));
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_limit_is_64kb() {
        assert_eq!(MAX_BODY_SIZE, 65_536);
    }

    #[test]
    fn request_timeout_is_30s() {
        assert_eq!(REQUEST_TIMEOUT_SECS, 30);
    }
}
