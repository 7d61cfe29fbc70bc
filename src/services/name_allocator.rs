use crate::db::{PhotoRepository, RepoError};
use crate::models::photo::{NewPhoto, PhotoRecord};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Next sequential name for `prefix` given every name currently stored.
///
/// Only names of the exact shape `<prefix><digits>` count. Suffixes too large
/// for a `u64` are ignored rather than wrapping.
pub fn next_name(prefix: &str, names: &[String]) -> String {
    let max = names
        .iter()
        .filter_map(|name| name.strip_prefix(prefix))
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max();

    let next = max.and_then(|n| n.checked_add(1)).unwrap_or(1);
    format!("{prefix}{next}")
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("Could not allocate a unique name after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Optimistic allocator: read the max, insert, and re-read on a unique-name conflict.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    prefix: String,
    max_attempts: u32,
}

impl NameAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Name that would be given right now. Not reserved.
    pub async fn allocate_name(&self, repo: &dyn PhotoRepository) -> Result<String, RepoError> {
        let names = repo.list_all_names().await?;
        Ok(next_name(&self.prefix, &names))
    }

    /// Insert a new photo under the next free name.
    ///
    /// `original_url` maps the chosen name to the URL stored with the record.
    pub async fn create_with_retry<F>(
        &self,
        repo: &dyn PhotoRepository,
        quantity: i32,
        original_url: F,
    ) -> Result<PhotoRecord, AllocationError>
    where
        F: Fn(&str) -> Option<String> + Send + Sync,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let name = self.allocate_name(repo).await?;
            let photo = NewPhoto {
                original_url: original_url(&name),
                name,
                quantity,
            };

            match repo.insert_photo(photo).await {
                Ok(record) => {
                    metrics::counter!("photos_created_total").increment(1);
                    tracing::info!(photo_id = record.id, name = %record.name, attempt, "Photo record created");
                    return Ok(record);
                }
                Err(RepoError::UniqueViolation(name)) => {
                    metrics::counter!("name_allocation_conflicts_total").increment(1);
                    tracing::warn!(name = %name, attempt, "Photo name taken concurrently, retrying");
                    last_error = format!("name '{name}' already exists");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AllocationError::Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}
