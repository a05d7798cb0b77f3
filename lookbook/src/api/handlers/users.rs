//! HTTP handlers for anonymous users and their credit ledger.

use crate::{
    AppState,
    api::models::{
        credits::{CreditEntryResponse, CreditGrantCreate, CreditGrantResponse, CreditsResponse},
        pagination::Pagination,
        users::{AnonymousUserCreate, AnonymousUserResponse, MAX_DEVICE_ID_LEN, UserEnvelope, UserResponse, UserUpdate},
    },
    db::models::{
        credits::CreditGrantDBRequest,
        users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    errors::{Error, Result},
    types::UserId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Load a user or fail with 404
pub(crate) async fn require_user(state: &AppState, user_id: UserId) -> Result<UserDBResponse> {
    state.store.get_user(user_id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: user_id.to_string(),
    })
}

/// Register a device, or return the user it already belongs to
#[utoipa::path(
    post,
    path = "/users/anonymous",
    tag = "users",
    summary = "Register an anonymous user",
    description = "Returns the existing user for a known device. New users receive the configured initial credits as a grant.",
    request_body = AnonymousUserCreate,
    responses(
        (status = 201, description = "User created", body = AnonymousUserResponse),
        (status = 200, description = "Device already registered", body = AnonymousUserResponse),
        (status = 400, description = "Invalid device id"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register_anonymous(
    State(state): State<AppState>,
    Json(data): Json<AnonymousUserCreate>,
) -> Result<(StatusCode, Json<AnonymousUserResponse>)> {
    let device_id = data.device_id.trim();
    if device_id.is_empty() || device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(Error::BadRequest {
            message: format!("device_id must be between 1 and {MAX_DEVICE_ID_LEN} characters"),
        });
    }

    if let Some(existing) = state.store.get_user_by_device(device_id).await? {
        return Ok((StatusCode::OK, Json(AnonymousUserResponse::existing(existing))));
    }

    let request = UserCreateDBRequest {
        device_id: device_id.to_string(),
        initial_credits: state.config.credits.initial_credits,
    };
    match state.store.create_user(&request).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, credits = user.credit_balance, "Registered anonymous user");
            Ok((
                StatusCode::CREATED,
                Json(AnonymousUserResponse {
                    success: true,
                    user: UserResponse::from(user),
                    created: true,
                }),
            ))
        }
        // Lost a registration race for the same device
        Err(e) if e.is_unique_violation(None) => {
            let existing = state.store.get_user_by_device(device_id).await?.ok_or(Error::Database(e))?;
            Ok((StatusCode::OK, Json(AnonymousUserResponse::existing(existing))))
        }
        Err(e) => Err(e.into()),
    }
}

impl AnonymousUserResponse {
    fn existing(user: UserDBResponse) -> Self {
        Self {
            success: true,
            user: UserResponse::from(user),
            created: false,
        }
    }
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get a user",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User profile", body = UserEnvelope),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<Json<UserEnvelope>> {
    let user = require_user(&state, user_id).await?;
    Ok(Json(UserEnvelope {
        success: true,
        user: user.into(),
    }))
}

#[utoipa::path(
    patch,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Update a user",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserEnvelope),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(data): Json<UserUpdate>,
) -> Result<Json<UserEnvelope>> {
    let user = state
        .store
        .update_user(user_id, &UserUpdateDBRequest { is_pro: data.is_pro })
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })?;
    Ok(Json(UserEnvelope {
        success: true,
        user: user.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/credits",
    tag = "credits",
    summary = "Get balance and ledger",
    description = "Current balance with the user's ledger entries, newest first.",
    params(("user_id" = uuid::Uuid, Path, description = "User ID"), Pagination),
    responses(
        (status = 200, description = "Balance and ledger page", body = CreditsResponse),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_credits(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<CreditsResponse>> {
    let user = require_user(&state, user_id).await?;
    let (skip, limit) = pagination.params();

    let entries = state.store.list_entries(user_id, skip, limit).await?;
    let total_count = state.store.count_entries(user_id).await?;

    Ok(Json(CreditsResponse {
        success: true,
        balance: user.credit_balance,
        data: entries.into_iter().map(CreditEntryResponse::from).collect(),
        total_count,
        skip,
        limit,
    }))
}

#[utoipa::path(
    post,
    path = "/users/{user_id}/credits",
    tag = "credits",
    summary = "Grant credits",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    request_body = CreditGrantCreate,
    responses(
        (status = 201, description = "Credits granted", body = CreditGrantResponse),
        (status = 400, description = "Amount must be positive"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn grant_credits(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(data): Json<CreditGrantCreate>,
) -> Result<(StatusCode, Json<CreditGrantResponse>)> {
    if data.amount <= 0 {
        return Err(Error::BadRequest {
            message: "Amount must be greater than zero".to_string(),
        });
    }
    require_user(&state, user_id).await?;

    let entry = state
        .store
        .grant(&CreditGrantDBRequest {
            user_id,
            amount: data.amount,
            description: data.description,
        })
        .await?;
    tracing::info!(user_id = %user_id, amount = entry.amount, balance = entry.balance_after, "Granted credits");

    Ok((
        StatusCode::CREATED,
        Json(CreditGrantResponse {
            success: true,
            balance: entry.balance_after,
            entry: entry.into(),
        }),
    ))
}
