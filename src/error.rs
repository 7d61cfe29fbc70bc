use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::RepoError;
use crate::services::name_allocator::AllocationError;
use crate::services::post_processor::PostProcessError;
use crate::services::providers::ProviderError;
use crate::services::storage::StorageError;

/// Errors surfaced by the photo service and its HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Provider is throttling us and the retry budget is spent.
    #[error("{0}")]
    RateLimited(String),

    /// Provider refused the request or could not be reached.
    #[error("{0}")]
    ProviderRequest(String),

    /// Provider reported a definite failure.
    #[error("Generation failed for job {job_id}")]
    GenerationFailed { job_id: String },

    /// No terminal state within the polling budget.
    #[error("Generation for job {job_id} did not finish after {attempts} polls")]
    TimedOut { job_id: String, attempts: u32 },

    #[error("Generation for job {job_id} finished without producing an image")]
    NoOutput { job_id: String },

    #[error("Could not allocate a unique photo name after {attempts} attempts")]
    NameAllocationExhausted { attempts: u32 },

    #[error("{0}")]
    AssetMissing(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Persistence(RepoError),

    #[error("Image processing failed: {0}")]
    Image(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        AppError::NotFound(what.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::RateLimited(_) => "provider_rate_limited",
            Self::ProviderRequest(_) => "provider_request_error",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::TimedOut { .. } => "generation_timed_out",
            Self::NoOutput { .. } => "generation_no_output",
            Self::NameAllocationExhausted { .. } => "name_allocation_exhausted",
            Self::AssetMissing(_) => "asset_missing",
            Self::Storage(_) => "storage_error",
            Self::Persistence(_) => "persistence_error",
            Self::Image(_) => "image_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ProviderRequest(_) | Self::GenerationFailed { .. } | Self::NoOutput { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::NameAllocationExhausted { .. } => StatusCode::CONFLICT,
            Self::AssetMissing(_) | Self::Storage(_) | Self::Persistence(_) | Self::Image(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Infrastructure detail stays in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::AssetMissing(_) | Self::Storage(_) | Self::Persistence(_) | Self::Image(_) => {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Validation(msg) => AppError::Validation(msg),
            ProviderError::RateLimited(msg) => AppError::RateLimited(msg),
            other => AppError::ProviderRequest(other.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        AppError::Persistence(e)
    }
}

impl From<PostProcessError> for AppError {
    fn from(e: PostProcessError) -> Self {
        match e {
            PostProcessError::AssetMissing(msg) => AppError::AssetMissing(msg),
            other => AppError::Image(other.to_string()),
        }
    }
}

impl From<AllocationError> for AppError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::Exhausted { attempts, .. } => {
                AppError::NameAllocationExhausted { attempts }
            }
            AllocationError::Repo(repo) => AppError::Persistence(repo),
        }
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::Validation(report.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    kind: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                kind: self.kind(),
                message: self.client_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}
