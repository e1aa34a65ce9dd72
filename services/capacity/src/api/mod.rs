//! HTTP API handlers and routing.

mod capacity;
pub mod error;
mod health;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints (no auth required)
        .merge(health::routes())
        // API v1 routes
        .nest("/v1", capacity::routes())
        // Middleware
        .layer(TraceLayer::new_for_http())
        // Application state
        .with_state(state)
}
