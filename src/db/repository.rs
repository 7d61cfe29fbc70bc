use async_trait::async_trait;

use crate::models::photo::{NewPhoto, PhotoRecord, PhotoUpdate};

/// Storage seam for photo records.
///
/// Each call is its own unit of work. Uniqueness of `name` is enforced by the
/// store, so a racing insert surfaces as [`RepoError::UniqueViolation`].
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    async fn list_all_names(&self) -> Result<Vec<String>, RepoError>;

    async fn insert_photo(&self, photo: NewPhoto) -> Result<PhotoRecord, RepoError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, RepoError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<PhotoRecord>, RepoError>;

    /// Apply only the fields set in `update`. Returns `None` if no row has `id`.
    async fn update_fields(
        &self,
        id: i64,
        update: PhotoUpdate,
    ) -> Result<Option<PhotoRecord>, RepoError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Duplicate photo name: {0}")]
    UniqueViolation(String),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepoError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, RepoError::UniqueViolation(_))
    }
}
