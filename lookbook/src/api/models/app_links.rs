//! API request/response models for store links.

use crate::{
    db::models::app_links::{AppLinkDBResponse, GLOBAL_COUNTRY, Platform},
    types::AppLinkId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Lower-cased, trimmed country code; empty means global
pub fn normalize_country(country: Option<&str>) -> String {
    match country.map(str::trim).filter(|c| !c.is_empty()) {
        Some(country) => country.to_lowercase(),
        None => GLOBAL_COUNTRY.to_string(),
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AppLinkQuery {
    pub platform: Platform,
    /// ISO country code; omit to list every link for the platform
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppLinkUpsert {
    pub platform: Platform,
    /// Defaults to `global`
    pub country: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppLinkResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AppLinkId,
    pub platform: Platform,
    pub country: String,
    pub url: String,
    pub updated_at: DateTime<Utc>,
}

impl From<AppLinkDBResponse> for AppLinkResponse {
    fn from(db: AppLinkDBResponse) -> Self {
        Self {
            id: db.id,
            platform: db.platform,
            country: db.country,
            url: db.url,
            updated_at: db.updated_at,
        }
    }
}

/// Result of a platform/country lookup
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppLinkLookupResponse {
    pub success: bool,
    pub link: AppLinkResponse,
    /// True when no row matched the country and the `global` row was returned
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppLinkListResponse {
    pub success: bool,
    pub links: Vec<AppLinkResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AppLinksResponse {
    Lookup(AppLinkLookupResponse),
    List(AppLinkListResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppLinkEnvelope {
    pub success: bool,
    pub link: AppLinkResponse,
}
