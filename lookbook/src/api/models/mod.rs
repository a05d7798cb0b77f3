//! API request and response data models.
//!
//! API models are distinct from database models so the JSON contract can evolve
//! independently of the schema. Every successful response carries `"success": true`;
//! failures use [`ErrorEnvelope`](crate::errors::ErrorEnvelope).
//!
//! - [`users`], [`credits`]: anonymous registration, profiles and the credit ledger
//! - [`generations`]: generation requests and status views
//! - [`prompts`]: standalone prompt enhancement
//! - [`favorites`], [`catalog`], [`app_links`]: reference data

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod app_links;
pub mod catalog;
pub mod credits;
pub mod favorites;
pub mod generations;
pub mod pagination;
pub mod prompts;
pub mod users;

/// Body of endpoints that only report success, such as deletions
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
