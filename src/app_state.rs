use sqlx::PgPool;
use std::sync::Arc;

use crate::services::photo_service::PhotoService;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub photos: Arc<PhotoService>,
}

impl AppState {
    pub fn new(db: PgPool, photos: PhotoService) -> Self {
        Self {
            db,
            photos: Arc::new(photos),
        }
    }
}
