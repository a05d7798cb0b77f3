//! HTTP handlers for favourite locations.

use crate::{
    AppState,
    api::{
        handlers::users::require_user,
        models::{
            SuccessResponse,
            favorites::{FavoriteCreate, FavoriteEnvelope, FavoriteResponse, FavoritesResponse},
        },
    },
    db::{handlers::favorites::FAVORITE_UNIQUE_CONSTRAINT, models::favorites::FavoriteCreateDBRequest},
    errors::{Error, Result},
    types::UserId,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

#[utoipa::path(
    get,
    path = "/favorites/{user_id}",
    tag = "favorites",
    summary = "List favourite locations",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Favourites, newest first", body = FavoritesResponse))
)]
#[tracing::instrument(skip_all)]
pub async fn list_favorites(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<Json<FavoritesResponse>> {
    let favorites = state.store.list_favorites(user_id).await?;
    Ok(Json(FavoritesResponse {
        success: true,
        favorites: favorites.into_iter().map(FavoriteResponse::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/favorites/{user_id}",
    tag = "favorites",
    summary = "Add a favourite location",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    request_body = FavoriteCreate,
    responses(
        (status = 201, description = "Favourite added", body = FavoriteEnvelope),
        (status = 400, description = "Missing location id"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Already a favourite (code ALREADY_FAVORITED)"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn add_favorite(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(data): Json<FavoriteCreate>,
) -> Result<(StatusCode, Json<FavoriteEnvelope>)> {
    let location_id = data.location_id.trim();
    if location_id.is_empty() {
        return Err(Error::BadRequest {
            message: "location_id is required".to_string(),
        });
    }
    require_user(&state, user_id).await?;

    let request = FavoriteCreateDBRequest {
        user_id,
        location_id: location_id.to_string(),
        location_name: data.location_name,
        location_data: data.location_data,
    };
    let favorite = state.store.add_favorite(&request).await.map_err(|e| {
        if e.is_unique_violation(Some(FAVORITE_UNIQUE_CONSTRAINT)) {
            Error::Conflict {
                message: "Location is already in favorites".to_string(),
                code: "ALREADY_FAVORITED".to_string(),
            }
        } else {
            e.into()
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(FavoriteEnvelope {
            success: true,
            favorite: favorite.into(),
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/favorites/{user_id}/{location_id}",
    tag = "favorites",
    summary = "Remove a favourite location",
    params(
        ("user_id" = uuid::Uuid, Path, description = "User ID"),
        ("location_id" = String, Path, description = "Location key"),
    ),
    responses(
        (status = 200, description = "Favourite removed", body = SuccessResponse),
        (status = 404, description = "Not a favourite"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn remove_favorite(
    State(state): State<AppState>,
    Path((user_id, location_id)): Path<(UserId, String)>,
) -> Result<Json<SuccessResponse>> {
    if !state.store.remove_favorite(user_id, &location_id).await? {
        return Err(Error::NotFound {
            resource: "Favorite".to_string(),
            id: location_id,
        });
    }
    Ok(Json(SuccessResponse::new("Removed from favorites")))
}
