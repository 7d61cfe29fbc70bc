pub mod extract;
pub mod generation;
pub mod health;
pub mod metrics;
pub mod photos;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;

use crate::app_state::AppState;

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Application routes. `/metrics` is mounted separately since it has its own state.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/photos/upload", post(photos::upload_photo))
        .route(
            "/photos/{id}",
            get(photos::get_photo).patch(photos::update_photo),
        )
        .route("/photos/{id}/generate", post(photos::generate))
        .route(
            "/photos/by-name/{name}/generated",
            post(photos::save_generated_by_name),
        )
        .route(
            "/photos/by-name/{name}/quantity",
            patch(photos::update_quantity_by_name),
        )
        .route("/generate", post(generation::submit_generation))
        .route("/progress/{job_id}", get(generation::progress))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
