pub mod dispatch;
pub mod health;
pub mod schemas;
pub mod webhooks;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state_factory::Gateway;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub started_at: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway: Arc::new(gateway), started_at: std::time::Instant::now() }
    }
}

/// Builds the Axum router: request intake, provider webhooks, live push,
/// and health/metrics. There is no admin surface and no auth layer here --
/// the gateway's own session/tenant auth is out of scope for this server.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/dispatch", post(dispatch::dispatch))
        .route("/webhooks/auth", post(webhooks::auth))
        .route("/webhooks/dlr", post(webhooks::dlr))
        .route("/webhooks/cdr", post(webhooks::cdr))
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/ws", get(ws::upgrade))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
