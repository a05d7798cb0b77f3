//! API request/response models for favourite locations.

use crate::{
    db::models::favorites::FavoriteDBResponse,
    types::{FavoriteId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FavoriteCreate {
    /// App-defined location key, unique per user
    pub location_id: String,
    pub location_name: Option<String>,
    /// Opaque location payload stored as is
    #[schema(value_type = Option<Object>)]
    pub location_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FavoriteResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: FavoriteId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub location_id: String,
    pub location_name: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub location_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<FavoriteDBResponse> for FavoriteResponse {
    fn from(db: FavoriteDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            location_id: db.location_id,
            location_name: db.location_name,
            location_data: db.location_data,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FavoritesResponse {
    pub success: bool,
    pub favorites: Vec<FavoriteResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FavoriteEnvelope {
    pub success: bool,
    pub favorite: FavoriteResponse,
}
