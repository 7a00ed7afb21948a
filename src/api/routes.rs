//! API route definitions

use axum::routing::get;
use axum::routing::post;
use axum::Router;

use super::handlers::AppState;
use super::handlers::{
    self,
};

/// Create RESTful API router
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Classification endpoints
        .route("/classify", post(handlers::classify))
        .route("/classify/batch", post(handlers::classify_batch))
        // Taxonomy
        .route("/taxonomy/refresh", post(handlers::refresh_taxonomy))
        // Statistics
        .route("/stats", get(handlers::get_stats))
        .with_state(state)
}
