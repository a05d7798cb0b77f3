//! HTTP handlers for the pose and hair style catalogs, and users' custom poses.

use crate::{
    AppState,
    api::{
        handlers::users::require_user,
        models::{
            SuccessResponse,
            catalog::{
                CatalogQuery, CustomPoseCreate, CustomPoseEnvelope, CustomPoseResponse, CustomPosesResponse,
                HairStyleResponse, HairStylesResponse, PoseResponse, PosesResponse,
            },
        },
    },
    db::models::catalog::{CatalogFilter, CustomPoseCreateDBRequest},
    errors::{Error, Result},
    types::{PoseId, UserId},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

#[utoipa::path(
    get,
    path = "/poses",
    tag = "catalog",
    summary = "List poses",
    params(CatalogQuery),
    responses((status = 200, description = "Active poses in display order", body = PosesResponse))
)]
#[tracing::instrument(skip_all)]
pub async fn list_poses(State(state): State<AppState>, Query(query): Query<CatalogQuery>) -> Result<Json<PosesResponse>> {
    let poses = state.store.list_poses(&CatalogFilter::from(query)).await?;
    Ok(Json(PosesResponse {
        success: true,
        poses: poses.into_iter().map(PoseResponse::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/hair-styles",
    tag = "catalog",
    summary = "List hair styles",
    params(CatalogQuery),
    responses((status = 200, description = "Active hair styles in display order", body = HairStylesResponse))
)]
#[tracing::instrument(skip_all)]
pub async fn list_hair_styles(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<HairStylesResponse>> {
    let hair_styles = state.store.list_hair_styles(&CatalogFilter::from(query)).await?;
    Ok(Json(HairStylesResponse {
        success: true,
        hair_styles: hair_styles.into_iter().map(HairStyleResponse::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/poses",
    tag = "catalog",
    summary = "List a user's custom poses",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Custom poses, newest first", body = CustomPosesResponse))
)]
#[tracing::instrument(skip_all)]
pub async fn list_custom_poses(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<CustomPosesResponse>> {
    let poses = state.store.list_custom_poses(user_id).await?;
    Ok(Json(CustomPosesResponse {
        success: true,
        poses: poses.into_iter().map(CustomPoseResponse::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/users/{user_id}/poses",
    tag = "catalog",
    summary = "Create a custom pose",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    request_body = CustomPoseCreate,
    responses(
        (status = 201, description = "Pose created", body = CustomPoseEnvelope),
        (status = 400, description = "Missing name or prompt"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_custom_pose(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(data): Json<CustomPoseCreate>,
) -> Result<(StatusCode, Json<CustomPoseEnvelope>)> {
    let (name, prompt) = (data.name.trim(), data.prompt.trim());
    if name.is_empty() || prompt.is_empty() {
        return Err(Error::BadRequest {
            message: "name and prompt are required".to_string(),
        });
    }
    require_user(&state, user_id).await?;

    let pose = state
        .store
        .create_custom_pose(&CustomPoseCreateDBRequest {
            user_id,
            name: name.to_string(),
            prompt: prompt.to_string(),
            thumbnail_url: data.thumbnail_url,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CustomPoseEnvelope {
            success: true,
            pose: pose.into(),
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}/poses/{pose_id}",
    tag = "catalog",
    summary = "Delete a custom pose",
    params(
        ("user_id" = uuid::Uuid, Path, description = "User ID"),
        ("pose_id" = uuid::Uuid, Path, description = "Pose ID"),
    ),
    responses(
        (status = 200, description = "Pose deleted", body = SuccessResponse),
        (status = 404, description = "Pose not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_custom_pose(
    State(state): State<AppState>,
    Path((user_id, pose_id)): Path<(UserId, PoseId)>,
) -> Result<Json<SuccessResponse>> {
    if !state.store.delete_custom_pose(user_id, pose_id).await? {
        return Err(Error::NotFound {
            resource: "Pose".to_string(),
            id: pose_id.to_string(),
        });
    }
    Ok(Json(SuccessResponse::new("Pose deleted")))
}
