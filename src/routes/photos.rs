use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::photo::{
    GenerateRequest, PhotoFieldsRequest, PhotoRecord, QuantityUpdateRequest, SaveGeneratedRequest,
};
use crate::routes::extract::{ApiPath, ValidJson};

/// POST /photos/upload: store an image under the next sequential name.
pub async fn upload_photo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<PhotoRecord>)> {
    let mut upload: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let declared = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("could not read file: {e}")))?;

        let format = image::guess_format(&data)
            .map_err(|_| AppError::Validation("file is not a supported image".into()))?;
        let content_type = declared
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or_else(|| format.to_mime_type().to_string());

        upload = Some((data.to_vec(), content_type));
    }

    let (data, content_type) =
        upload.ok_or_else(|| AppError::Validation("multipart field 'file' is required".into()))?;
    let record = state.photos.upload_photo(&data, &content_type).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /photos/{id}/generate
pub async fn generate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ValidJson(body): ValidJson<GenerateRequest>,
) -> AppResult<Json<PhotoRecord>> {
    let record = state
        .photos
        .generate(id, &body.prompt, &body.aspect_ratio)
        .await?;
    Ok(Json(record))
}

/// GET /photos/{id}
pub async fn get_photo(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> AppResult<Json<PhotoRecord>> {
    Ok(Json(state.photos.get_photo(id).await?))
}

/// PATCH /photos/{id}
pub async fn update_photo(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ValidJson(body): ValidJson<PhotoFieldsRequest>,
) -> AppResult<Json<PhotoRecord>> {
    let record = state
        .photos
        .update_fields(id, body.quantity, body.printed)
        .await?;
    Ok(Json(record))
}

/// POST /photos/by-name/{name}/generated
pub async fn save_generated_by_name(
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ValidJson(body): ValidJson<SaveGeneratedRequest>,
) -> AppResult<Json<PhotoRecord>> {
    let record = state
        .photos
        .save_generated_by_name(&name, &body.image_url, body.gender, &body.theme)
        .await?;
    Ok(Json(record))
}

/// PATCH /photos/by-name/{name}/quantity
pub async fn update_quantity_by_name(
    State(state): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ValidJson(body): ValidJson<QuantityUpdateRequest>,
) -> AppResult<Json<PhotoRecord>> {
    let record = state
        .photos
        .update_quantity_by_name(&name, body.quantity)
        .await?;
    Ok(Json(record))
}
