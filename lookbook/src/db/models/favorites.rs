//! Database models for favourite locations.

use crate::types::{FavoriteId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct FavoriteCreateDBRequest {
    pub user_id: UserId,
    pub location_id: String,
    pub location_name: Option<String>,
    pub location_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FavoriteDBResponse {
    pub id: FavoriteId,
    pub user_id: UserId,
    pub location_id: String,
    pub location_name: Option<String>,
    pub location_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
