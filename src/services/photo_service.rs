use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::PhotoRepository;
use crate::error::{AppError, AppResult};
use crate::models::generation::{GenerationOptions, JobState, ReferenceImage};
use crate::models::photo::{Gender, PhotoRecord, PhotoUpdate, ProgressResponse};
use crate::services::job_monitor::{JobMonitor, MonitorOutcome};
use crate::services::name_allocator::NameAllocator;
use crate::services::post_processor::{self, FrameSet};
use crate::services::providers::GenerationProvider;
use crate::services::storage::ObjectStorage;
use crate::services::task_store::TaskStore;

const GENERATED_CONTENT_TYPE: &str = "image/png";
const PROGRESS_TTL: Duration = Duration::from_secs(60 * 60);

/// Key the original upload of `name` is stored under.
pub fn original_key(name: &str) -> String {
    format!("{name}.png")
}

/// Key the framed generated image of `name` is stored under.
pub fn generated_key(name: &str) -> String {
    format!("{name}IA.png")
}

/// Prompt used when a standalone generation only names a source image.
pub fn default_prompt(source_url: &str) -> String {
    format!("Create an image based on the following URL: {source_url}")
}

/// Standalone generation request, not tied to a stored photo.
#[derive(Debug, Clone, Default)]
pub struct SubmitGeneration {
    pub prompt: Option<String>,
    pub source_url: Option<String>,
    pub ratio: String,
    pub exact_ratio: Option<String>,
    pub model: Option<String>,
    pub reference_images: Vec<ReferenceImage>,
}

/// Orchestrates uploads, generation and post-processing of photos.
pub struct PhotoService {
    repo: Arc<dyn PhotoRepository>,
    storage: Arc<dyn ObjectStorage>,
    provider: Arc<dyn GenerationProvider>,
    monitor: JobMonitor,
    frames: FrameSet,
    names: NameAllocator,
    /// Last view handed to `/progress` callers, per job id.
    progress_views: TaskStore,
}

impl PhotoService {
    pub fn new(
        repo: Arc<dyn PhotoRepository>,
        storage: Arc<dyn ObjectStorage>,
        provider: Arc<dyn GenerationProvider>,
        monitor: JobMonitor,
        frames: FrameSet,
        names: NameAllocator,
    ) -> Self {
        Self {
            repo,
            storage,
            provider,
            monitor,
            frames,
            names,
            progress_views: TaskStore::new(PROGRESS_TTL),
        }
    }

    /// Store an uploaded image as a new photo under the next sequential name.
    ///
    /// The record is inserted before the bytes are written, so a name lost to a
    /// concurrent upload never overwrites the winner's object.
    pub async fn upload_photo(&self, data: &[u8], content_type: &str) -> AppResult<PhotoRecord> {
        if data.is_empty() {
            return Err(AppError::Validation("uploaded file is empty".into()));
        }

        let storage = Arc::clone(&self.storage);
        let record = self
            .names
            .create_with_retry(self.repo.as_ref(), 0, move |name| {
                Some(storage.public_url(&original_key(name)))
            })
            .await?;

        self.storage
            .put(data, &original_key(&record.name), content_type)
            .await
            .inspect_err(|e| {
                tracing::error!(photo_name = %record.name, error = %e, "Photo record created but upload failed");
            })?;

        Ok(record)
    }

    pub async fn get_photo(&self, id: i64) -> AppResult<PhotoRecord> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Photo {id}")))
    }

    /// Generate a variant for an existing photo, frame it and attach it.
    ///
    /// If the provider fails or runs out of time the record is left as it was.
    pub async fn generate(&self, id: i64, prompt: &str, ratio: &str) -> AppResult<PhotoRecord> {
        let record = self.get_photo(id).await?;
        if prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt must not be empty".into()));
        }

        let started = Instant::now();
        let options = GenerationOptions {
            ratio: Some(ratio.to_string()),
            reference_urls: record.original_url.iter().cloned().collect(),
            ..GenerationOptions::default()
        };
        let job_id = self.submit(prompt, &options).await?;
        let image_url = self.await_first_url(&job_id, &record.name).await?;

        let base = self.storage.get(&image_url).await?;
        let url = self.frame_and_store(&record.name, base).await?;

        let updated = self
            .repo
            .update_fields(
                record.id,
                PhotoUpdate {
                    generated_url: Some(url),
                    ..PhotoUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| AppError::not_found(format!("Photo {id}")))?;

        metrics::histogram!("generation_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            photo_id = updated.id,
            photo_name = %updated.name,
            job_id = %job_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated image attached"
        );
        Ok(updated)
    }

    /// Frame an externally generated image and attach it with its metadata.
    pub async fn save_generated_by_name(
        &self,
        name: &str,
        image_url: &str,
        gender: Gender,
        theme: &str,
    ) -> AppResult<PhotoRecord> {
        let record = self.find_by_name(name).await?;

        let base = self.storage.get(image_url).await?;
        let url = self.frame_and_store(&record.name, base).await?;

        self.repo
            .update_fields(
                record.id,
                PhotoUpdate {
                    generated_url: Some(url),
                    gender: Some(gender),
                    theme: Some(theme.to_string()),
                    ..PhotoUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| AppError::not_found(format!("Photo '{name}'")))
    }

    /// Setting a quantity by name also marks the photo printed.
    pub async fn update_quantity_by_name(&self, name: &str, quantity: i32) -> AppResult<PhotoRecord> {
        if quantity < 0 {
            return Err(AppError::Validation("quantity must be >= 0".into()));
        }
        let record = self.find_by_name(name).await?;
        self.repo
            .update_fields(
                record.id,
                PhotoUpdate {
                    quantity: Some(quantity),
                    printed: Some(true),
                    ..PhotoUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| AppError::not_found(format!("Photo '{name}'")))
    }

    pub async fn update_fields(
        &self,
        id: i64,
        quantity: Option<i32>,
        printed: Option<bool>,
    ) -> AppResult<PhotoRecord> {
        if quantity.is_some_and(|q| q < 0) {
            return Err(AppError::Validation("quantity must be >= 0".into()));
        }
        self.repo
            .update_fields(
                id,
                PhotoUpdate {
                    quantity,
                    printed,
                    ..PhotoUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| AppError::not_found(format!("Photo {id}")))
    }

    /// Start a generation job without waiting for it. Returns the job id.
    ///
    /// The source image, when given, is also passed to the provider as a reference.
    pub async fn submit_generation(&self, request: SubmitGeneration) -> AppResult<String> {
        let source_url = request
            .source_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let prompt = match (
            request.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()),
            source_url,
        ) {
            (Some(prompt), _) => prompt.to_string(),
            (None, Some(url)) => default_prompt(url),
            (None, None) => {
                return Err(AppError::Validation(
                    "either prompt or sourceUrl is required".into(),
                ))
            }
        };

        let options = GenerationOptions {
            ratio: Some(request.ratio),
            exact_ratio: request.exact_ratio,
            reference_urls: source_url.map(String::from).into_iter().collect(),
            reference_images: request.reference_images,
            model_override: request.model,
        };
        self.submit(&prompt, &options).await
    }

    /// One poll of a job, as seen by a client.
    ///
    /// Polls are folded into a per-job view, so the reported percentage never goes
    /// down and a finished job stays finished even if a later poll comes back unknown.
    pub async fn progress(&self, job_id: &str) -> ProgressResponse {
        let polled = self.provider.poll(job_id).await;
        let status = self
            .progress_views
            .track(job_id, self.provider.kind(), &polled);
        let image_urls = (status.state == JobState::Succeeded && !status.result_urls.is_empty())
            .then_some(status.result_urls);
        ProgressResponse {
            progress: status.percentage,
            state: status.state,
            image_urls,
        }
    }

    async fn find_by_name(&self, name: &str) -> AppResult<PhotoRecord> {
        self.repo
            .get_by_name(name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Photo '{name}'")))
    }

    async fn submit(&self, prompt: &str, options: &GenerationOptions) -> AppResult<String> {
        let job_id = self
            .monitor
            .submit_with_retry(self.provider.as_ref(), prompt, options)
            .await?;
        metrics::counter!("generation_jobs_submitted_total").increment(1);
        Ok(job_id)
    }

    async fn await_first_url(&self, job_id: &str, photo_name: &str) -> AppResult<String> {
        match self
            .monitor
            .await_completion(self.provider.as_ref(), job_id)
            .await
        {
            MonitorOutcome::Succeeded(urls) => match urls.into_iter().next() {
                Some(url) => {
                    metrics::counter!("generation_jobs_succeeded_total").increment(1);
                    Ok(url)
                }
                None => {
                    tracing::warn!(job_id, photo_name, "Generation succeeded without output");
                    Err(AppError::NoOutput {
                        job_id: job_id.to_string(),
                    })
                }
            },
            MonitorOutcome::Failed => {
                metrics::counter!("generation_jobs_failed_total").increment(1);
                tracing::error!(job_id, photo_name, "Provider reported generation failure");
                Err(AppError::GenerationFailed {
                    job_id: job_id.to_string(),
                })
            }
            MonitorOutcome::TimedOut { attempts } => {
                metrics::counter!("generation_jobs_timed_out_total").increment(1);
                tracing::warn!(job_id, photo_name, attempts, "Generation timed out, record left unchanged");
                Err(AppError::TimedOut {
                    job_id: job_id.to_string(),
                    attempts,
                })
            }
            MonitorOutcome::Cancelled => Err(AppError::TimedOut {
                job_id: job_id.to_string(),
                attempts: 0,
            }),
        }
    }

    /// Compose `base` with the photo's frame and store it under the generated key.
    async fn frame_and_store(&self, photo_name: &str, base: Vec<u8>) -> AppResult<String> {
        let (asset, frame) = self.frames.load(photo_name).await?;
        tracing::debug!(photo_name, frame = asset.number, "Applying frame");

        let composed = tokio::task::spawn_blocking(move || post_processor::compose(&base, &frame))
            .await
            .map_err(|e| AppError::Image(format!("compose task failed: {e}")))??;

        let url = self
            .storage
            .put(&composed, &generated_key(photo_name), GENERATED_CONTENT_TYPE)
            .await?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys() {
        assert_eq!(original_key("photo3"), "photo3.png");
        assert_eq!(generated_key("photo3"), "photo3IA.png");
    }

    #[test]
    fn test_default_prompt_embeds_url() {
        assert!(default_prompt("https://cdn/p.png").ends_with("https://cdn/p.png"));
    }
}
