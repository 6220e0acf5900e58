//! Wayfare API — HTTP surface, configuration, and background workers.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod state;
pub mod workers;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router.
pub fn build_router(app_state: AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/bookings", routes::bookings::router())
        .nest("/api/v1/payments", routes::payments::router())
        .nest("/api/v1/matching", routes::matching::router())
        .nest("/api/v1/admin", routes::admin::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
