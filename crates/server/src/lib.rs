//! Dragonrock relay library
//!
//! The binary in `main.rs` is a thin wrapper; everything testable lives
//! here so integration tests can run the real router on an ephemeral port.

pub mod logging;
pub mod state;
pub mod websocket;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use crate::state::Registry;
pub use crate::websocket::{ws_handler, SharedRegistry};

/// Build the relay router around an injected registry.
pub fn router(registry: SharedRegistry) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(registry)
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn status_handler(State(registry): State<SharedRegistry>) -> impl IntoResponse {
    let registry = registry.lock().await;
    Json(serde_json::json!({
        "uptime": registry.uptime_secs(),
        "activeTables": registry.table_count(),
        "activeUsers": registry.identity_count(),
    }))
}
