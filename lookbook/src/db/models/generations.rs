//! Database models for generation rows (`reference_results`) and prediction attempts.

use crate::generation::status::{FailureReason, GenerationStatus};
use crate::types::{GenerationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database request for creating a pending generation
#[derive(Debug, Clone)]
pub struct GenerationCreateDBRequest {
    pub generation_id: GenerationId,
    pub user_id: UserId,
    pub original_prompt: String,
    pub reference_images: Vec<String>,
    pub settings: serde_json::Value,
    pub aspect_ratio: String,
}

/// Field updates written together with a status transition. `None` leaves the column as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationUpdateDBRequest {
    pub enhanced_prompt: Option<String>,
    pub model: Option<String>,
    pub prediction_id: Option<String>,
    pub result_image_url: Option<String>,
    pub failure_reason: Option<FailureReason>,
    pub error_message: Option<String>,
}

impl GenerationUpdateDBRequest {
    pub fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn completed(result_image_url: impl Into<String>) -> Self {
        Self {
            result_image_url: Some(result_image_url.into()),
            ..Default::default()
        }
    }
}

/// Database response for a generation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GenerationDBResponse {
    pub generation_id: GenerationId,
    pub user_id: UserId,
    pub status: GenerationStatus,
    pub original_prompt: String,
    pub enhanced_prompt: Option<String>,
    pub result_image_url: Option<String>,
    pub reference_images: Vec<String>,
    pub settings: serde_json::Value,
    pub aspect_ratio: String,
    pub model: Option<String>,
    pub prediction_id: Option<String>,
    pub failure_reason: Option<FailureReason>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Database request for recording a prediction attempt
#[derive(Debug, Clone)]
pub struct PredictionCreateDBRequest {
    pub id: String,
    pub generation_id: GenerationId,
    pub user_id: UserId,
    pub model: String,
    pub status: String,
}

/// Database response for a prediction attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PredictionDBResponse {
    pub id: String,
    pub generation_id: GenerationId,
    pub user_id: UserId,
    pub model: String,
    pub status: String,
    pub output_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
