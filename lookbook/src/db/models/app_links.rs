//! Database models for store links.

use crate::types::AppLinkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

/// Country code of the row used when no country-specific link exists
pub const GLOBAL_COUNTRY: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppLinkUpsertDBRequest {
    pub platform: Platform,
    /// Normalized to lower case before it reaches the database
    pub country: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AppLinkDBResponse {
    pub id: AppLinkId,
    pub platform: Platform,
    pub country: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
