use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::generation::{JobState, ReferenceImage};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// A stored photo and its generated variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoRecord {
    pub id: i64,
    /// Unique, always `<prefix><N>`.
    pub name: String,
    pub original_url: Option<String>,
    pub generated_url: Option<String>,
    pub quantity: i32,
    pub printed: bool,
    pub gender: Option<Gender>,
    pub theme: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a fresh record.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub name: String,
    pub quantity: i32,
    pub original_url: Option<String>,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoUpdate {
    pub quantity: Option<i32>,
    pub printed: Option<bool>,
    pub generated_url: Option<String>,
    pub gender: Option<Gender>,
    pub theme: Option<String>,
}

/// Body of `POST /photos/{id}/generate`.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    #[garde(length(min = 1, max = 4000))]
    pub prompt: String,

    #[garde(length(min = 1, max = 32))]
    #[serde(default = "default_photo_ratio")]
    pub aspect_ratio: String,
}

fn default_photo_ratio() -> String {
    "9:16".to_string()
}

/// Body of `POST /photos/by-name/{name}/generated`.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveGeneratedRequest {
    #[garde(length(min = 1, max = 2048), custom(is_http_url))]
    pub image_url: String,

    #[garde(skip)]
    pub gender: Gender,

    #[garde(length(chars, min = 1, max = 100))]
    pub theme: String,
}

/// Body of `PATCH /photos/by-name/{name}/quantity`.
#[derive(Debug, Deserialize, Validate)]
pub struct QuantityUpdateRequest {
    #[garde(range(min = 0))]
    pub quantity: i32,
}

/// Body of `PATCH /photos/{id}`.
#[derive(Debug, Deserialize, Validate)]
pub struct PhotoFieldsRequest {
    #[garde(range(min = 0))]
    pub quantity: Option<i32>,

    #[garde(skip)]
    pub printed: Option<bool>,
}

/// Body of `POST /generate`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitGenerationRequest {
    #[garde(length(max = 4000))]
    pub prompt: Option<String>,

    #[garde(custom(is_optional_http_url))]
    pub source_url: Option<String>,

    #[garde(length(min = 1, max = 32))]
    #[serde(default = "default_submit_ratio")]
    pub aspect_ratio: String,

    /// Provider-native size such as `1080:1920`, used as given.
    #[garde(length(min = 1, max = 32))]
    pub exact_ratio: Option<String>,

    #[garde(length(min = 1, max = 64))]
    pub model: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub reference_images: Vec<ReferenceImage>,
}

fn default_submit_ratio() -> String {
    "1:1".to_string()
}

#[derive(Debug, Serialize)]
pub struct SubmitGenerationResponse {
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub progress: u8,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
}

fn is_optional_http_url(value: &Option<String>, ctx: &()) -> garde::Result {
    match value {
        Some(url) => is_http_url(url, ctx),
        None => Ok(()),
    }
}

fn is_http_url(value: &str, _ctx: &()) -> garde::Result {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(garde::Error::new("must be an http(s) URL"))
    }
}
