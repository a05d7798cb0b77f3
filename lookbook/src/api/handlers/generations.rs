//! HTTP handlers for generations: creation, status, history and cleanup.

use crate::{
    AppState,
    api::models::{
        generations::{
            ActiveGenerationsResponse, GenerationCleanupQuery, GenerationCleanupResponse, GenerationEnvelope,
            GenerationFromUrlsCreate, GenerationOwnerQuery, GenerationResponse, GenerationUpload, PredictionResponse,
            PredictionsResponse,
        },
        pagination::{Page, Pagination},
    },
    errors::{Error, Result},
    generation::{GenerationRequest, ReferenceSource, lifecycle},
    prompts::GenerationSettings,
    types::{GenerationId, UserId},
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use bytes::Bytes;
use chrono::Utc;

/// Upper bound for cleanup age, keeping the cutoff inside the database's timestamp range
const MAX_CLEANUP_DAYS: i64 = 36_500;

/// Run a generation on its own task so a disconnecting client does not abandon it midway
async fn run_generation(state: &AppState, request: GenerationRequest) -> Result<(StatusCode, Json<GenerationEnvelope>)> {
    let service = state.generations.clone();
    let generation = tokio::spawn(async move { service.generate(request).await })
        .await
        .map_err(|e| Error::Internal {
            operation: format!("run generation task: {e}"),
        })??;

    Ok((
        StatusCode::CREATED,
        Json(GenerationEnvelope {
            success: true,
            generation: GenerationResponse::from(generation),
        }),
    ))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> Error {
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {e}"),
    }
}

/// Create a generation from uploaded photos
#[utoipa::path(
    post,
    path = "/generations",
    tag = "generations",
    summary = "Generate from uploaded photos",
    description = "Runs the full generation: reference upload, prompt enhancement, prediction and credit settlement.",
    request_body(content = GenerationUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Generation completed", body = GenerationEnvelope),
        (status = 400, description = "Invalid input or sensitive content"),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Upstream or internal failure"),
        (status = 503, description = "Generation timed out"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_generation(State(state): State<AppState>, mut multipart: Multipart) -> Result<(StatusCode, Json<GenerationEnvelope>)> {
    let mut user_id: Option<UserId> = None;
    let mut prompt: Option<String> = None;
    let mut settings = GenerationSettings::default();
    let mut aspect_ratio: Option<String> = None;
    let mut images: Vec<Bytes> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" | "images" | "image1" | "image2" => {
                let data = field.bytes().await.map_err(multipart_error)?;
                if !data.is_empty() {
                    images.push(data);
                }
            }
            "user_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                user_id = Some(text.trim().parse().map_err(|_| Error::BadRequest {
                    message: "user_id must be a UUID".to_string(),
                })?);
            }
            "prompt" => prompt = Some(field.text().await.map_err(multipart_error)?),
            "settings" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    settings = serde_json::from_str(&text).map_err(|e| Error::BadRequest {
                        message: format!("settings must be a JSON object: {e}"),
                    })?;
                }
            }
            "aspect_ratio" => aspect_ratio = Some(field.text().await.map_err(multipart_error)?),
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let user_id = user_id.ok_or_else(|| Error::BadRequest {
        message: "user_id is required".to_string(),
    })?;
    let request = GenerationRequest {
        user_id,
        prompt: prompt.unwrap_or_default(),
        settings,
        aspect_ratio,
        references: ReferenceSource::Uploaded(images),
    };
    run_generation(&state, request).await
}

/// Create a generation from reference image URLs
#[utoipa::path(
    post,
    path = "/generations/from-urls",
    tag = "generations",
    summary = "Generate from image URLs",
    request_body = GenerationFromUrlsCreate,
    responses(
        (status = 201, description = "Generation completed", body = GenerationEnvelope),
        (status = 400, description = "Invalid input or sensitive content"),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Upstream or internal failure"),
        (status = 503, description = "Generation timed out"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_generation_from_urls(
    State(state): State<AppState>,
    Json(data): Json<GenerationFromUrlsCreate>,
) -> Result<(StatusCode, Json<GenerationEnvelope>)> {
    let request = GenerationRequest {
        user_id: data.user_id,
        prompt: data.prompt,
        settings: data.settings,
        aspect_ratio: data.aspect_ratio,
        references: ReferenceSource::Urls(data.reference_image_urls),
    };
    run_generation(&state, request).await
}

/// Current status of a generation; a stale one is failed and refunded first
#[utoipa::path(
    get,
    path = "/generations/{generation_id}",
    tag = "generations",
    summary = "Get generation status",
    params(("generation_id" = uuid::Uuid, Path, description = "Generation ID"), GenerationOwnerQuery),
    responses(
        (status = 200, description = "Generation", body = GenerationEnvelope),
        (status = 404, description = "Generation not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_generation(
    State(state): State<AppState>,
    Path(generation_id): Path<GenerationId>,
    Query(query): Query<GenerationOwnerQuery>,
) -> Result<Json<GenerationEnvelope>> {
    let row = state
        .store
        .get_generation(generation_id)
        .await?
        .filter(|row| row.user_id == query.user_id)
        .ok_or_else(|| Error::NotFound {
            resource: "Generation".to_string(),
            id: generation_id.to_string(),
        })?;

    let row = lifecycle::expire_if_stale(
        state.store.as_ref(),
        state.config.credits.generation_cost,
        row,
        state.config.generations.stale_after,
    )
    .await?;

    Ok(Json(GenerationEnvelope {
        success: true,
        generation: row.into(),
    }))
}

/// Upstream predictions behind a generation, for support and debugging
#[utoipa::path(
    get,
    path = "/generations/{generation_id}/predictions",
    tag = "generations",
    summary = "List a generation's predictions",
    params(("generation_id" = uuid::Uuid, Path, description = "Generation ID"), GenerationOwnerQuery),
    responses(
        (status = 200, description = "Predictions, oldest first", body = PredictionsResponse),
        (status = 404, description = "Generation not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_generation_predictions(
    State(state): State<AppState>,
    Path(generation_id): Path<GenerationId>,
    Query(query): Query<GenerationOwnerQuery>,
) -> Result<Json<PredictionsResponse>> {
    state
        .store
        .get_generation(generation_id)
        .await?
        .filter(|row| row.user_id == query.user_id)
        .ok_or_else(|| Error::NotFound {
            resource: "Generation".to_string(),
            id: generation_id.to_string(),
        })?;
    let predictions = state.store.list_predictions(generation_id).await?;

    Ok(Json(PredictionsResponse {
        success: true,
        predictions: predictions.into_iter().map(PredictionResponse::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/generations",
    tag = "generations",
    summary = "List a user's generations",
    params(("user_id" = uuid::Uuid, Path, description = "User ID"), Pagination),
    responses(
        (status = 200, description = "Generations, newest first", body = Page<GenerationResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_generations(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<GenerationResponse>>> {
    let (skip, limit) = pagination.params();
    let rows = state.store.list_generations(user_id, skip, limit).await?;
    let total_count = state.store.count_generations(user_id).await?;

    Ok(Json(Page::new(
        rows.into_iter().map(GenerationResponse::from).collect(),
        total_count,
        &pagination,
    )))
}

/// Expire the user's stale generations, then list the ones still running
#[utoipa::path(
    get,
    path = "/users/{user_id}/generations/active",
    tag = "generations",
    summary = "List active generations",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Pending and processing generations", body = ActiveGenerationsResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_active_generations(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ActiveGenerationsResponse>> {
    let expired = lifecycle::expire_stale(
        state.store.as_ref(),
        state.config.credits.generation_cost,
        Some(user_id),
        state.config.generations.stale_after,
    )
    .await?;
    let active = state.store.list_active_generations(user_id).await?;

    Ok(Json(ActiveGenerationsResponse {
        success: true,
        generations: active.into_iter().map(GenerationResponse::from).collect(),
        expired: expired.into_iter().map(|row| row.generation_id).collect(),
    }))
}

/// Delete finished generations older than the given number of days
#[utoipa::path(
    delete,
    path = "/users/{user_id}/generations",
    tag = "generations",
    summary = "Clean up old generations",
    params(("user_id" = uuid::Uuid, Path, description = "User ID"), GenerationCleanupQuery),
    responses(
        (status = 200, description = "Number of deleted generations", body = GenerationCleanupResponse),
        (status = 400, description = "older_than_days out of range"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_old_generations(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<GenerationCleanupQuery>,
) -> Result<Json<GenerationCleanupResponse>> {
    if !(1..=MAX_CLEANUP_DAYS).contains(&query.older_than_days) {
        return Err(Error::BadRequest {
            message: format!("older_than_days must be between 1 and {MAX_CLEANUP_DAYS}"),
        });
    }
    let before = Utc::now() - chrono::Duration::days(query.older_than_days);

    let deleted = state.store.delete_generations_older_than(user_id, before).await?;
    tracing::info!(user_id = %user_id, deleted, "Deleted old generations");

    Ok(Json(GenerationCleanupResponse { success: true, deleted }))
}
