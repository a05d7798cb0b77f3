//! API request/response models for the pose and hair style catalogs.

use crate::{
    db::models::catalog::{CatalogFilter, CustomPoseDBResponse, HairStyleDBResponse, PoseDBResponse},
    types::{PoseId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CatalogQuery {
    /// `female`, `male`, ...; unisex entries always match
    pub gender: Option<String>,
    pub category: Option<String>,
}

impl From<CatalogQuery> for CatalogFilter {
    fn from(query: CatalogQuery) -> Self {
        let normalize = |value: Option<String>| {
            value
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
        };
        Self {
            gender: normalize(query.gender),
            category: normalize(query.category),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoseResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PoseId,
    pub name: String,
    pub gender: Option<String>,
    pub category: Option<String>,
    pub prompt: String,
    pub thumbnail_url: Option<String>,
}

impl From<PoseDBResponse> for PoseResponse {
    fn from(db: PoseDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            gender: db.gender,
            category: db.category,
            prompt: db.prompt,
            thumbnail_url: db.thumbnail_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HairStyleResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub name: String,
    pub gender: Option<String>,
    pub prompt: String,
    pub thumbnail_url: Option<String>,
}

impl From<HairStyleDBResponse> for HairStyleResponse {
    fn from(db: HairStyleDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            gender: db.gender,
            prompt: db.prompt,
            thumbnail_url: db.thumbnail_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomPoseCreate {
    pub name: String,
    pub prompt: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomPoseResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PoseId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub name: String,
    pub prompt: String,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CustomPoseDBResponse> for CustomPoseResponse {
    fn from(db: CustomPoseDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            prompt: db.prompt,
            thumbnail_url: db.thumbnail_url,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PosesResponse {
    pub success: bool,
    pub poses: Vec<PoseResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HairStylesResponse {
    pub success: bool,
    pub hair_styles: Vec<HairStyleResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomPosesResponse {
    pub success: bool,
    pub poses: Vec<CustomPoseResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomPoseEnvelope {
    pub success: bool,
    pub pose: CustomPoseResponse,
}
