//! Generation provider capability and its two conformers.
//!
//! `apiframe` talks to the remote API on every call. `runway` runs the remote
//! round trips in a background task and answers polls from a [`TaskStore`].

pub mod apiframe;
pub mod runway;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use crate::config::{AppConfig, ConfigError};
use crate::models::generation::{GenerationOptions, NormalizedStatus, ProviderKind};
use crate::services::task_store::TaskStore;

pub use apiframe::ApiframeProvider;
pub use runway::{RunwayClient, RunwayProvider, RunwaySchedule};

/// Something that can turn a prompt into images, asynchronously.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Start a job and return its opaque identifier.
    async fn submit(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;

    /// Current status of a job. Unanswerable polls come back as [`JobState::Unknown`].
    ///
    /// [`JobState::Unknown`]: crate::models::generation::JobState::Unknown
    async fn poll(&self, job_id: &str) -> NormalizedStatus;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid generation request: {0}")]
    Validation(String),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Provider rejected request ({status}): {message}")]
    Request { status: u16, message: String },

    #[error("Provider request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Only rate limiting is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

/// Turn a non-success submit response into the matching [`ProviderError`].
pub(crate) async fn ensure_success(
    response: Response,
    provider: ProviderKind,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(
        provider = %provider,
        status = status.as_u16(),
        body = %body,
        "Provider rejected submit"
    );

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited(format!(
            "{provider} returned 429, try again shortly"
        )));
    }
    Err(ProviderError::Request {
        status: status.as_u16(),
        message: body,
    })
}

/// Build the provider selected by `IMAGE_PROVIDER`.
pub fn from_config(
    config: &AppConfig,
    http: reqwest::Client,
) -> Result<Arc<dyn GenerationProvider>, ConfigError> {
    match config.image_provider {
        ProviderKind::Apiframe => {
            let api_key = config
                .apiframe_api_key
                .clone()
                .ok_or(ConfigError::Missing("APIFRAME_API_KEY"))?;
            let provider = ApiframeProvider::new(
                http,
                &config.apiframe_imagine_base,
                &config.apiframe_fetch_base,
                api_key,
            )
            .with_mode(config.apiframe_mode.clone())
            .with_webhook(
                config.apiframe_webhook_url.clone(),
                config.apiframe_webhook_secret.clone(),
            );
            Ok(Arc::new(provider))
        }
        ProviderKind::Runway => {
            let api_key = config
                .runway_api_key
                .clone()
                .ok_or(ConfigError::Missing("RUNWAY_API_KEY"))?;
            let client = RunwayClient::new(
                http.clone(),
                &config.runway_base_url,
                api_key,
                &config.runway_api_version,
            );
            let store = Arc::new(TaskStore::new(Duration::from_secs(
                config.runway_task_ttl_secs,
            )));
            let schedule = RunwaySchedule {
                poll_interval: Duration::from_millis(config.runway_poll_interval_ms),
                max_polls: config.runway_max_polls,
                ..RunwaySchedule::default()
            };
            Ok(Arc::new(RunwayProvider::new(
                Arc::new(client),
                store,
                http,
                &config.runway_model,
                schedule,
            )))
        }
    }
}
