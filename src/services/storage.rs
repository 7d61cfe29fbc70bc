use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use s3::creds::Credentials;
use s3::{Bucket, Region};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Object storage seam: write bytes under a key, read bytes back by URL.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// URL the object stored under `key` is served from.
    fn public_url(&self, key: &str) -> String;

    /// Store `data` under `key` and return its public URL.
    async fn put(&self, data: &[u8], key: &str, content_type: &str) -> Result<String, StorageError>;

    /// Fetch bytes from any reachable URL, not just this bucket.
    async fn get(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}

/// S3-compatible storage settings.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub public_base_url: Option<String>,
}

/// Client for AWS S3 or any S3-compatible endpoint (MinIO, R2).
pub struct S3Storage {
    bucket: Box<Bucket>,
    http: Client,
    settings: S3Settings,
}

impl S3Storage {
    pub fn new(settings: S3Settings, http: Client) -> Result<Self, StorageError> {
        let region = match settings.endpoint.as_deref() {
            Some(endpoint) => Region::Custom {
                region: settings.region.clone(),
                endpoint: endpoint.to_string(),
            },
            None => settings
                .region
                .parse::<Region>()
                .map_err(|e| StorageError::Config(e.to_string()))?,
        };

        let credentials = Credentials::new(
            Some(settings.access_key.as_str()),
            Some(settings.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut bucket = Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        if settings.endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            http,
            settings,
        })
    }
}

/// Public URL for `key` under the configured layout.
pub fn public_url_for(settings: &S3Settings, key: &str) -> String {
    let key = key.trim_start_matches('/');
    if let Some(base) = settings.public_base_url.as_deref().filter(|b| !b.is_empty()) {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    }
    match settings.endpoint.as_deref() {
        Some(endpoint) if !endpoint.contains("amazonaws.com") => format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            settings.bucket,
            key
        ),
        _ => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            settings.bucket, settings.region, key
        ),
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn public_url(&self, key: &str) -> String {
        public_url_for(&self.settings, key)
    }

    async fn put(&self, data: &[u8], key: &str, content_type: &str) -> Result<String, StorageError> {
        let response = tokio::time::timeout(
            UPLOAD_TIMEOUT,
            self.bucket.put_object_with_content_type(key, data, content_type),
        )
        .await
        .map_err(|_| StorageError::Timeout(format!("upload of '{key}'")))??;

        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(StorageError::Rejected {
                status: code,
                key: key.to_string(),
            });
        }

        tracing::debug!(key, bytes = data.len(), "Object stored");
        Ok(self.public_url(key))
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Upload rejected with status {status} for '{key}'")]
    Rejected { status: u16, key: String },

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Storage call timed out: {0}")]
    Timeout(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
