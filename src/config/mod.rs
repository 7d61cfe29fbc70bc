use serde::Deserialize;

use crate::models::generation::ProviderKind;
use crate::services::storage::S3Settings;

/// Process configuration. Every field maps to the upper-cased environment variable.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    pub s3_bucket: String,
    pub s3_access_key_id: String,
    pub s3_secret_access_key: String,
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    /// S3-compatible endpoint (MinIO, R2). Unset means AWS.
    pub s3_endpoint_url: Option<String>,
    /// Overrides the URL stored objects are served from.
    pub s3_public_base_url: Option<String>,

    /// Which provider serves generation requests. No runtime failover.
    #[serde(default = "default_image_provider")]
    pub image_provider: ProviderKind,

    pub apiframe_api_key: Option<String>,
    #[serde(default = "default_apiframe_imagine_base")]
    pub apiframe_imagine_base: String,
    #[serde(default = "default_apiframe_fetch_base")]
    pub apiframe_fetch_base: String,
    /// `fast` or `turbo`
    pub apiframe_mode: Option<String>,
    pub apiframe_webhook_url: Option<String>,
    pub apiframe_webhook_secret: Option<String>,

    pub runway_api_key: Option<String>,
    #[serde(default = "default_runway_model")]
    pub runway_model: String,
    #[serde(default = "default_runway_base_url")]
    pub runway_base_url: String,
    #[serde(default = "default_runway_api_version")]
    pub runway_api_version: String,
    #[serde(default = "default_runway_poll_interval_ms")]
    pub runway_poll_interval_ms: u64,
    #[serde(default = "default_runway_max_polls")]
    pub runway_max_polls: u32,
    #[serde(default = "default_runway_task_ttl_secs")]
    pub runway_task_ttl_secs: u64,

    #[serde(default = "default_monitor_max_attempts")]
    pub monitor_max_attempts: u32,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Rate-limit retries around a provider submit
    #[serde(default = "default_submit_max_retries")]
    pub submit_max_retries: u32,

    /// Directory holding frame1.png and frame2.png
    #[serde(default = "default_frame_dir")]
    pub frame_dir: String,
    #[serde(default = "default_photo_name_prefix")]
    pub photo_name_prefix: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_image_provider() -> ProviderKind {
    ProviderKind::Apiframe
}

fn default_apiframe_imagine_base() -> String {
    "https://api.apiframe.ai/pro".to_string()
}

fn default_apiframe_fetch_base() -> String {
    "https://api.apiframe.pro".to_string()
}

fn default_runway_model() -> String {
    "gen4_image".to_string()
}

fn default_runway_base_url() -> String {
    "https://api.runwayml.com/v1".to_string()
}

fn default_runway_api_version() -> String {
    "2024-11-06".to_string()
}

fn default_runway_poll_interval_ms() -> u64 {
    5000
}

fn default_runway_max_polls() -> u32 {
    120
}

fn default_runway_task_ttl_secs() -> u64 {
    3600
}

fn default_monitor_max_attempts() -> u32 {
    40
}

fn default_monitor_interval_ms() -> u64 {
    2000
}

fn default_submit_max_retries() -> u32 {
    3
}

fn default_frame_dir() -> String {
    "assets".to_string()
}

fn default_photo_name_prefix() -> String {
    "photo".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.s3_bucket.clone(),
            region: self.s3_region.clone(),
            endpoint: self.s3_endpoint_url.clone().filter(|e| !e.is_empty()),
            access_key: self.s3_access_key_id.clone(),
            secret_key: self.s3_secret_access_key.clone(),
            public_base_url: self.s3_public_base_url.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid environment: {0}")]
    Env(#[from] envy::Error),
}
