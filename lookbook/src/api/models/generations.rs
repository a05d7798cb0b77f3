//! API request/response models for generations.

use crate::{
    db::models::generations::{GenerationDBResponse, PredictionDBResponse},
    generation::GenerationState,
    prompts::GenerationSettings,
    types::{GenerationId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// Request models

/// JSON variant of generation creation, with references given as URLs
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationFromUrlsCreate {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub prompt: String,
    /// Free-form generation settings (`productType`, `age`, `gender`, `pose`, ...)
    #[serde(default)]
    #[schema(value_type = Object)]
    pub settings: GenerationSettings,
    /// `"W:H"`, snapped to the nearest supported ratio
    pub aspect_ratio: Option<String>,
    /// One or two public image URLs
    pub reference_image_urls: Vec<String>,
}

/// Multipart form of generation creation. Documentation only; the handler reads the
/// fields as they stream in.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct GenerationUpload {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: String,
    pub prompt: String,
    /// JSON-encoded generation settings
    pub settings: Option<String>,
    pub aspect_ratio: Option<String>,
    /// One or two reference photos
    #[schema(value_type = Vec<String>, format = Binary)]
    pub image: Vec<Vec<u8>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GenerationOwnerQuery {
    /// Owner of the generation
    #[param(value_type = String, format = "uuid")]
    pub user_id: UserId,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GenerationCleanupQuery {
    /// Delete finished generations created more than this many days ago
    pub older_than_days: i64,
}

// Response models

/// A generation row. The status-dependent fields come from its [`GenerationState`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GenerationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub generation_id: GenerationId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[serde(flatten)]
    pub state: GenerationState,
    pub original_prompt: String,
    pub enhanced_prompt: Option<String>,
    pub reference_images: Vec<String>,
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
    pub aspect_ratio: String,
    pub prediction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GenerationDBResponse> for GenerationResponse {
    fn from(db: GenerationDBResponse) -> Self {
        Self {
            state: GenerationState::from(&db),
            generation_id: db.generation_id,
            user_id: db.user_id,
            original_prompt: db.original_prompt,
            enhanced_prompt: db.enhanced_prompt,
            reference_images: db.reference_images,
            settings: db.settings,
            aspect_ratio: db.aspect_ratio,
            prediction_id: db.prediction_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GenerationEnvelope {
    pub success: bool,
    pub generation: GenerationResponse,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveGenerationsResponse {
    pub success: bool,
    /// Generations still pending or processing
    pub generations: Vec<GenerationResponse>,
    /// Generations this request moved to `failed` because they were stale
    #[schema(value_type = Vec<String>)]
    pub expired: Vec<GenerationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationCleanupResponse {
    pub success: bool,
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{FailureReason, GenerationStatus};
    use uuid::Uuid;

    #[test]
    fn test_response_flattens_state() {
        let now = Utc::now();
        let row = GenerationDBResponse {
            generation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: GenerationStatus::Failed,
            original_prompt: "ring".to_string(),
            enhanced_prompt: None,
            result_image_url: None,
            reference_images: vec![],
            settings: serde_json::json!({ "productType": "jewelry" }),
            aspect_ratio: "1:1".to_string(),
            model: None,
            prediction_id: None,
            failure_reason: Some(FailureReason::Timeout),
            error_message: Some("Generation did not finish within 15 minutes".to_string()),
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        };

        let json = serde_json::to_value(GenerationResponse::from(row)).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "timeout");
        assert_eq!(json["settings"]["productType"], "jewelry");
        assert!(json.get("result_image_url").is_none());
    }
}

/// One upstream prediction run on behalf of a generation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PredictionResponse {
    pub id: String,
    pub model: String,
    /// Upstream status, or `timed_out` when polling gave up
    pub status: String,
    pub output_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PredictionDBResponse> for PredictionResponse {
    fn from(db: PredictionDBResponse) -> Self {
        Self {
            id: db.id,
            model: db.model,
            status: db.status,
            output_url: db.output_url,
            error: db.error,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PredictionsResponse {
    pub success: bool,
    /// Oldest first; a fallback retry adds a second entry
    pub predictions: Vec<PredictionResponse>,
}
