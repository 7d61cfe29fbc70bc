use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::models::photo::{ProgressResponse, SubmitGenerationRequest, SubmitGenerationResponse};
use crate::routes::extract::{ApiPath, ValidJson};
use crate::services::photo_service::SubmitGeneration;

/// POST /generate: start a standalone job and return its id straight away.
pub async fn submit_generation(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<SubmitGenerationRequest>,
) -> AppResult<Json<SubmitGenerationResponse>> {
    let task_id = state
        .photos
        .submit_generation(SubmitGeneration {
            prompt: body.prompt,
            source_url: body.source_url,
            ratio: body.aspect_ratio,
            exact_ratio: body.exact_ratio,
            model: body.model,
            reference_images: body.reference_images,
        })
        .await?;
    Ok(Json(SubmitGenerationResponse { task_id }))
}

/// GET /progress/{job_id}
pub async fn progress(
    State(state): State<AppState>,
    ApiPath(job_id): ApiPath<String>,
) -> Json<ProgressResponse> {
    Json(state.photos.progress(&job_id).await)
}
