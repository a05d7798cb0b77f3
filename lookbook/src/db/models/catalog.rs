//! Database models for the pose and hair style catalogs.

use crate::types::{PoseId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Filter for catalog listings; `None` matches everything
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub gender: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PoseDBResponse {
    pub id: PoseId,
    pub name: String,
    pub gender: Option<String>,
    pub category: Option<String>,
    pub prompt: String,
    pub thumbnail_url: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CustomPoseCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
    pub prompt: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CustomPoseDBResponse {
    pub id: PoseId,
    pub user_id: UserId,
    pub name: String,
    pub prompt: String,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HairStyleDBResponse {
    pub id: Uuid,
    pub name: String,
    pub gender: Option<String>,
    pub prompt: String,
    pub thumbnail_url: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
