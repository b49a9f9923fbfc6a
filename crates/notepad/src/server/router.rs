//! HTTP Router
//!
//! Sets up the axum router with WebSocket endpoint.

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handler::handle_websocket;
use super::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // All PV traffic goes through the WebSocket
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub clients: usize,
    pub variables: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        clients: state.client_count(),
        variables: state.registry().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pv::{Registry, VariableDescriptor};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_counts_variables() {
        let registry = Arc::new(Registry::new());
        registry.register_if_absent(VariableDescriptor::internal("TST:helper", "helper", ""));

        let Json(health) = health_check(State(AppState::new(registry))).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.variables, 1);
        assert_eq!(health.clients, 0);
    }
}
