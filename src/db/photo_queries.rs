use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::repository::{PhotoRepository, RepoError};
use crate::models::photo::{Gender, NewPhoto, PhotoRecord, PhotoUpdate};

const PHOTO_COLUMNS: &str =
    "id, name, original_url, generated_url, quantity, printed, gender, theme, created_at, updated_at";

/// Postgres-backed [`PhotoRepository`]. Every call runs in its own transaction.
#[derive(Clone)]
pub struct PgPhotoRepository {
    pool: PgPool,
}

impl PgPhotoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_photo(row: &PgRow) -> Result<PhotoRecord, RepoError> {
    let gender: Option<String> = row.try_get("gender")?;
    let gender = gender
        .map(|g| Gender::from_str(&g).map_err(|_| RepoError::InvalidRow(format!("gender '{g}'"))))
        .transpose()?;

    Ok(PhotoRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        original_url: row.try_get("original_url")?,
        generated_url: row.try_get("generated_url")?,
        quantity: row.try_get("quantity")?,
        printed: row.try_get("printed")?,
        gender,
        theme: row.try_get("theme")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_insert_error(e: sqlx::Error, name: &str) -> RepoError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => RepoError::UniqueViolation(name.to_string()),
        _ => RepoError::Database(e),
    }
}

#[async_trait]
impl PhotoRepository for PgPhotoRepository {
    async fn list_all_names(&self) -> Result<Vec<String>, RepoError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query("SELECT name FROM photos")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(RepoError::from))
            .collect()
    }

    async fn insert_photo(&self, photo: NewPhoto) -> Result<PhotoRecord, RepoError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO photos (name, quantity, original_url)
            VALUES ($1, $2, $3)
            RETURNING {PHOTO_COLUMNS}
            "#
        ))
        .bind(&photo.name)
        .bind(photo.quantity)
        .bind(&photo.original_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, &photo.name))?;
        tx.commit().await?;

        row_to_photo(&row)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<PhotoRecord>, RepoError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        row.as_ref().map(row_to_photo).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<PhotoRecord>, RepoError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE name = $1"))
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        row.as_ref().map(row_to_photo).transpose()
    }

    async fn update_fields(
        &self,
        id: i64,
        update: PhotoUpdate,
    ) -> Result<Option<PhotoRecord>, RepoError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE photos
            SET quantity = COALESCE($2, quantity),
                printed = COALESCE($3, printed),
                generated_url = COALESCE($4, generated_url),
                gender = COALESCE($5, gender),
                theme = COALESCE($6, theme),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PHOTO_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.quantity)
        .bind(update.printed)
        .bind(&update.generated_url)
        .bind(update.gender.map(|g| g.to_string()))
        .bind(&update.theme)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.as_ref().map(row_to_photo).transpose()
    }
}
