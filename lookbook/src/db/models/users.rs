//! Database models for app users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database request for registering a device
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub device_id: String,
    /// Granted through the ledger in the same transaction as the insert
    pub initial_credits: i64,
}

/// Database request for updating a user
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub is_pro: Option<bool>,
}

/// Database response for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub device_id: String,
    pub credit_balance: i64,
    pub is_pro: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
