use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ensure_success, GenerationProvider, ProviderError};
use crate::models::generation::{GenerationOptions, JobState, NormalizedStatus, ProviderKind};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(90);
const POLL_TIMEOUT: Duration = Duration::from_secs(15);

static AR_FLAG: OnceLock<Regex> = OnceLock::new();

fn ar_flag() -> &'static Regex {
    AR_FLAG.get_or_init(|| Regex::new(r"(^|\s)--ar\s+\S+").expect("static regex"))
}

/// Append the `--ar <ratio>` prompt token the Midjourney API reads the aspect ratio from.
///
/// An existing `--ar` flag wins; nothing is duplicated.
pub fn inject_ar_flag(prompt: &str, ratio: Option<&str>) -> String {
    let Some(ratio) = ratio.map(str::trim).filter(|r| !r.is_empty()) else {
        return prompt.to_string();
    };
    if ar_flag().is_match(prompt) {
        return prompt.to_string();
    }
    format!("{} --ar {}", prompt.trim(), ratio)
}

/// Options the imagine endpoint has no field for.
pub fn ignored_options(options: &GenerationOptions) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if options.exact_ratio.is_some() {
        ignored.push("exact_ratio");
    }
    if options.model_override.is_some() {
        ignored.push("model");
    }
    if !options.reference_images.is_empty() {
        ignored.push("reference_images");
    }
    if !options.reference_urls.is_empty() {
        ignored.push("reference_urls");
    }
    ignored
}

#[derive(Serialize)]
struct ImagineRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_secret: Option<&'a str>,
}

#[derive(Deserialize)]
struct ImagineResponse {
    task_id: Option<String>,
}

/// Midjourney through Apiframe. Stateless: every call is a round trip.
pub struct ApiframeProvider {
    http: Client,
    imagine_base: String,
    fetch_base: String,
    api_key: String,
    mode: Option<String>,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
}

impl ApiframeProvider {
    pub fn new(http: Client, imagine_base: &str, fetch_base: &str, api_key: String) -> Self {
        Self {
            http,
            imagine_base: imagine_base.trim_end_matches('/').to_string(),
            fetch_base: fetch_base.trim_end_matches('/').to_string(),
            api_key,
            mode: None,
            webhook_url: None,
            webhook_secret: None,
        }
    }

    /// `fast` or `turbo`.
    pub fn with_mode(mut self, mode: Option<String>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_webhook(mut self, url: Option<String>, secret: Option<String>) -> Self {
        self.webhook_url = url;
        self.webhook_secret = secret;
        self
    }
}

#[async_trait]
impl GenerationProvider for ApiframeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Apiframe
    }

    async fn submit(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::Validation("prompt must not be empty".into()));
        }
        let ignored = ignored_options(options);
        if !ignored.is_empty() {
            tracing::debug!(provider = "apiframe", ?ignored, "Options not supported by Apiframe, ignoring");
        }
        let prompt = inject_ar_flag(prompt, options.ratio.as_deref());

        let body = ImagineRequest {
            prompt: &prompt,
            mode: self.mode.as_deref(),
            webhook_url: self.webhook_url.as_deref(),
            webhook_secret: self.webhook_secret.as_deref(),
        };

        let response = self
            .http
            .post(format!("{}/imagine", self.imagine_base))
            .header("Authorization", &self.api_key)
            .json(&body)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await?;
        let response = ensure_success(response, ProviderKind::Apiframe).await?;

        let data: ImagineResponse = response.json().await?;
        let task_id = data
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("missing 'task_id'".into()))?;

        tracing::info!(provider = "apiframe", job_id = %task_id, "Generation task started");
        Ok(task_id)
    }

    async fn poll(&self, job_id: &str) -> NormalizedStatus {
        let result = self
            .http
            .post(format!("{}/fetch", self.fetch_base))
            .header("Authorization", &self.api_key)
            .json(&serde_json::json!({ "task_id": job_id }))
            .timeout(POLL_TIMEOUT)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(provider = "apiframe", job_id, error = %e, "Fetch failed");
                return NormalizedStatus::unknown();
            }
        };

        match response.status() {
            StatusCode::OK => match response.json::<Value>().await {
                Ok(body) => normalize_fetch(&body),
                Err(e) => {
                    tracing::warn!(provider = "apiframe", job_id, error = %e, "Unreadable fetch body");
                    NormalizedStatus::unknown()
                }
            },
            StatusCode::TOO_MANY_REQUESTS => {
                NormalizedStatus::new(JobState::Throttled, None, Vec::new())
            }
            status => {
                tracing::warn!(provider = "apiframe", job_id, status = status.as_u16(), "Fetch rejected");
                NormalizedStatus::unknown()
            }
        }
    }
}

/// Translate an Apiframe `/fetch` body. Any result URL means the task is done.
pub fn normalize_fetch(body: &Value) -> NormalizedStatus {
    let urls = result_urls(body);
    if !urls.is_empty() {
        return NormalizedStatus::new(JobState::Succeeded, Some(100), urls);
    }

    let state = body
        .get("status")
        .and_then(Value::as_str)
        .map(map_status)
        .unwrap_or(JobState::Pending);
    NormalizedStatus::new(state, percentage(body.get("percentage")), Vec::new())
}

fn map_status(status: &str) -> JobState {
    match status.trim().to_ascii_lowercase().as_str() {
        "starting" | "processing" | "retrying" => JobState::Running,
        "finished" | "completed" | "succeeded" => JobState::Succeeded,
        "failed" | "error" => JobState::Failed,
        _ => JobState::Pending,
    }
}

fn result_urls(body: &Value) -> Vec<String> {
    for key in ["image_urls", "images", "image_url", "uri"] {
        match body.get(key) {
            Some(Value::Array(items)) => {
                let urls: Vec<String> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                if !urls.is_empty() {
                    return urls;
                }
            }
            Some(Value::String(url)) if !url.is_empty() => return vec![url.clone()],
            _ => {}
        }
    }
    Vec::new()
}

/// Apiframe reports 0-100, sometimes as a string.
fn percentage(value: Option<&Value>) -> Option<u8> {
    let raw = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| raw.clamp(0.0, 100.0) as u8)
}
