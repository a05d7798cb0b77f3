//! API request/response models for anonymous users.

use crate::{db::models::users::UserDBResponse, types::UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Longest accepted device identifier
pub const MAX_DEVICE_ID_LEN: usize = 255;

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnonymousUserCreate {
    /// Stable identifier of the installing device
    pub device_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserUpdate {
    pub is_pro: Option<bool>,
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub device_id: String,
    pub credit_balance: i64,
    pub is_pro: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            device_id: db.device_id,
            credit_balance: db.credit_balance,
            is_pro: db.is_pro,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserEnvelope {
    pub success: bool,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnonymousUserResponse {
    pub success: bool,
    pub user: UserResponse,
    /// False when the device was already registered
    pub created: bool,
}
