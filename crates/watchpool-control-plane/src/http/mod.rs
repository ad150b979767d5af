//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Watch task management (`/v1/task`, `/v1/tasks`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // API routes
        .route("/v1/task", post(handlers::create_task))
        .route("/v1/tasks", get(handlers::list_tasks))
        .route(
            "/v1/task/:id",
            get(handlers::get_task).delete(handlers::stop_task),
        )
        .route(
            "/v1/task/:id/increase-workers",
            put(handlers::increase_workers),
        )
        .route(
            "/v1/task/:id/decrease-workers",
            put(handlers::decrease_workers),
        )
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .with_state(state)
}
