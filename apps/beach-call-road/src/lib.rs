//! Rendezvous server for beach-call clients.

pub mod config;
pub mod websocket;

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use call_signaling::Relay;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::websocket::websocket_handler;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub online: usize,
}

pub async fn health_check(State(relay): State<Arc<Relay>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        online: relay.peers().len(),
    })
}

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket_handler))
        .with_state(relay)
        .layer(TraceLayer::new_for_http())
}
