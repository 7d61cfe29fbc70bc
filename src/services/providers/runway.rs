use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use uuid::Uuid;

use super::{ensure_success, GenerationProvider, ProviderError};
use crate::models::generation::{
    fraction_to_percentage, GenerationOptions, JobState, NormalizedStatus, ProviderKind,
    ReferenceImage,
};
use crate::services::aspect_ratio;
use crate::services::task_store::TaskStore;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const REFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Model that refuses to run without a reference image.
pub const TURBO_MODEL: &str = "gen4_image_turbo";

/// Body of `POST /text_to_image`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToImageRequest {
    pub prompt_text: String,
    pub ratio: String,
    pub model: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<ReferenceImage>,
}

/// Thin HTTP client for the Runway task API.
pub struct RunwayClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl RunwayClient {
    pub fn new(http: Client, base_url: &str, api_key: String, api_version: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: api_version.to_string(),
        }
    }

    /// Create a remote task and return Runway's task id.
    pub async fn create_task(&self, request: &TextToImageRequest) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(format!("{}/text_to_image", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Runway-Version", &self.api_version)
            .json(request)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await?;
        let response = ensure_success(response, ProviderKind::Runway).await?;

        let body: Value = response.json().await?;
        ["id", "taskId", "task_id"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map(String::from)
            .ok_or_else(|| ProviderError::InvalidResponse("response has no task id".into()))
    }

    /// Fetch a remote task. `Ok(None)` when Runway does not know the id.
    pub async fn task_status(&self, task_id: &str) -> Result<Option<NormalizedStatus>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/tasks/{}", self.base_url, task_id))
            .bearer_auth(&self.api_key)
            .header("X-Runway-Version", &self.api_version)
            .timeout(POLL_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => Ok(Some(NormalizedStatus::new(
                JobState::Throttled,
                None,
                Vec::new(),
            ))),
            status if status.is_success() => {
                let body: Value = response.json().await?;
                Ok(Some(normalize_task(&body)))
            }
            status => Err(ProviderError::Request {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Translate a Runway task body.
pub fn normalize_task(body: &Value) -> NormalizedStatus {
    let state = match body
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase()
        .as_str()
    {
        "RUNNING" => JobState::Running,
        "THROTTLED" => JobState::Throttled,
        "SUCCEEDED" => JobState::Succeeded,
        "FAILED" | "CANCELLED" => JobState::Failed,
        _ => JobState::Pending,
    };

    let native = body
        .get("progress")
        .and_then(Value::as_f64)
        .map(fraction_to_percentage);

    let urls = if state == JobState::Succeeded {
        body.get("output")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    NormalizedStatus::new(state, native, urls)
}

/// Timing of the background unit.
#[derive(Debug, Clone, Copy)]
pub struct RunwaySchedule {
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// Extra submit attempts after a 429.
    pub submit_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for RunwaySchedule {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_polls: 120,
            submit_retries: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Runway behind a local task table.
///
/// `submit` registers the job, spawns exactly one background unit for it and
/// returns a locally minted id straight away. `poll` only reads the table.
pub struct RunwayProvider {
    client: Arc<RunwayClient>,
    store: Arc<TaskStore>,
    http: Client,
    default_model: String,
    schedule: RunwaySchedule,
}

impl RunwayProvider {
    pub fn new(
        client: Arc<RunwayClient>,
        store: Arc<TaskStore>,
        http: Client,
        default_model: &str,
        schedule: RunwaySchedule,
    ) -> Self {
        Self {
            client,
            store,
            http,
            default_model: default_model.trim().to_string(),
            schedule,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }
}

#[async_trait]
impl GenerationProvider for RunwayProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Runway
    }

    async fn submit(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::Validation("prompt must not be empty".into()));
        }

        let model = options
            .model_override
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str())
            .to_string();

        if model == TURBO_MODEL
            && options.reference_images.is_empty()
            && options.reference_urls.is_empty()
        {
            return Err(ProviderError::Validation(format!(
                "{TURBO_MODEL} requires at least one reference image"
            )));
        }

        let ratio = match options.exact_ratio.as_deref().map(str::trim) {
            Some(exact) if !exact.is_empty() => exact.to_string(),
            _ => aspect_ratio::negotiate(options.ratio.as_deref(), &model),
        };

        let job_id = Uuid::new_v4().to_string();
        if !self.store.create(&job_id, ProviderKind::Runway) {
            return Err(ProviderError::InvalidResponse(format!(
                "job id {job_id} already registered"
            )));
        }

        let unit = BackgroundUnit {
            job_id: job_id.clone(),
            client: Arc::clone(&self.client),
            store: Arc::clone(&self.store),
            http: self.http.clone(),
            prompt: prompt.to_string(),
            model,
            ratio,
            reference_images: options.reference_images.clone(),
            reference_urls: options.reference_urls.clone(),
            schedule: self.schedule,
        };
        spawn_unit(unit);

        tracing::info!(provider = "runway", job_id = %job_id, "Generation task queued");
        Ok(job_id)
    }

    async fn poll(&self, job_id: &str) -> NormalizedStatus {
        self.store
            .status(job_id)
            .unwrap_or_else(NormalizedStatus::unknown)
    }
}

/// Run a unit and make sure its entry ends up Failed if it errors or panics.
///
/// A unit that stops polling an unfinished remote task returns `Ok` and leaves the
/// entry non-terminal.
fn spawn_unit(unit: BackgroundUnit) {
    let job_id = unit.job_id.clone();
    let store = Arc::clone(&unit.store);
    tokio::spawn(async move {
        match tokio::spawn(unit.run()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(provider = "runway", job_id = %job_id, error = %e, "Generation task failed");
                store.fail(&job_id, e.to_string());
            }
            Err(e) => {
                tracing::error!(provider = "runway", job_id = %job_id, error = %e, "Generation task aborted");
                store.fail(&job_id, "background task aborted");
            }
        }
    });
}

struct BackgroundUnit {
    job_id: String,
    client: Arc<RunwayClient>,
    store: Arc<TaskStore>,
    http: Client,
    prompt: String,
    model: String,
    ratio: String,
    reference_images: Vec<ReferenceImage>,
    reference_urls: Vec<String>,
    schedule: RunwaySchedule,
}

impl BackgroundUnit {
    async fn run(self) -> Result<(), ProviderError> {
        let (prompt, reference_images) = self.resolve_references().await;
        if self.model == TURBO_MODEL && reference_images.is_empty() {
            return Err(ProviderError::Validation(format!(
                "{TURBO_MODEL} requires at least one reference image"
            )));
        }

        let request = TextToImageRequest {
            prompt_text: prompt,
            ratio: self.ratio.clone(),
            model: self.model.clone(),
            reference_images,
        };
        let remote_id = self.create_with_backoff(&request).await?;
        tracing::info!(
            provider = "runway",
            job_id = %self.job_id,
            remote_id = %remote_id,
            "Remote task created"
        );

        for attempt in 1..=self.schedule.max_polls {
            sleep(self.schedule.poll_interval).await;
            match self.client.task_status(&remote_id).await {
                Ok(Some(status)) => {
                    tracing::debug!(
                        job_id = %self.job_id,
                        attempt,
                        state = %status.state,
                        percentage = status.percentage,
                        "Remote task polled"
                    );
                    let merged = self.store.observe(&self.job_id, &status);
                    if merged.is_some_and(|s| s.state.is_terminal()) {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    tracing::warn!(job_id = %self.job_id, remote_id = %remote_id, "Remote task not found");
                }
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, error = %e, "Remote task poll failed");
                }
            }
        }

        // Still running remotely: leave the entry open so the caller's own budget
        // decides, and a timeout is never reported as a failure.
        tracing::warn!(
            provider = "runway",
            job_id = %self.job_id,
            remote_id = %remote_id,
            polls = self.schedule.max_polls,
            "Remote task not finished, no longer polling"
        );
        Ok(())
    }

    async fn create_with_backoff(&self, request: &TextToImageRequest) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.client.create_task(request).await {
                Err(e) if e.is_retryable() && attempt < self.schedule.submit_retries => {
                    attempt += 1;
                    self.store.observe(
                        &self.job_id,
                        &NormalizedStatus::new(JobState::Throttled, None, Vec::new()),
                    );
                    tracing::warn!(job_id = %self.job_id, attempt, "Runway rate limited, backing off");
                    sleep(self.schedule.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    /// Explicit references win. Otherwise download the reference URLs into data URIs
    /// and tag the prompt so the model uses them.
    async fn resolve_references(&self) -> (String, Vec<ReferenceImage>) {
        if !self.reference_images.is_empty() {
            return (self.prompt.clone(), self.reference_images.clone());
        }

        let mut refs = Vec::new();
        for url in &self.reference_urls {
            match download_as_data_uri(&self.http, url).await {
                Ok(uri) => refs.push(ReferenceImage::new(uri)),
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, url = %url, error = %e, "Skipping reference image");
                }
            }
        }

        let prompt = if !refs.is_empty() && !self.prompt.contains("@ref") {
            format!("{} @ref", self.prompt.trim())
        } else {
            self.prompt.clone()
        };
        (prompt, refs)
    }
}

/// Encode bytes as a `data:` URI.
pub fn to_data_uri(bytes: &[u8], content_type: Option<&str>) -> String {
    let content_type = content_type.unwrap_or("image/png");
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{content_type};base64,{encoded}")
}

async fn download_as_data_uri(http: &Client, url: &str) -> Result<String, reqwest::Error> {
    let response = http
        .get(url)
        .timeout(REFERENCE_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = response.bytes().await?;
    Ok(to_data_uri(&bytes, content_type.as_deref()))
}
