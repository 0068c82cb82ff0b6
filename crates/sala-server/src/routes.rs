//! Axum router: health, WebSocket upgrade, metrics, CORS.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sala_core::ids::ParticipantId;
use sala_core::messages::now_timestamp;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broadcast::BroadcastEngine;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;
use crate::session;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct RelayState {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<BroadcastEngine>,
    router: Arc<MessageRouter>,
    metrics: PrometheusHandle,
}

impl RelayState {
    /// Wire up a fresh registry, broadcast engine, and message router.
    #[must_use]
    pub fn new(metrics: PrometheusHandle) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(BroadcastEngine::new(Arc::clone(&registry)));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
        ));
        Self {
            registry,
            broadcaster,
            router,
            metrics,
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

/// Build the relay's HTTP surface.
///
/// The permissive CORS layer mirrors the reference deployment, where the
/// browser front end is served from a different origin.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/ws/{client_id}", get(ws_upgrade))
        .route("/metrics", get(metrics_text))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness payload for external health checks. Not part of the relay
/// contract.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "Chat API is running",
        "timestamp": now_timestamp(),
    }))
}

/// Accept a new bidirectional channel keyed by the caller-chosen token and
/// hand it to the session lifecycle.
async fn ws_upgrade(
    Path(client_id): Path<String>,
    State(state): State<RelayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let id = ParticipantId::from_token(&client_id);
    ws.on_upgrade(move |socket| {
        session::run(state.registry, state.broadcaster, state.router, socket, id)
    })
}

async fn metrics_text(State(state): State<RelayState>) -> String {
    crate::metrics::render(&state.metrics)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
