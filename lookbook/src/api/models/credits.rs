//! API request/response models for credit balances and the ledger.

use crate::{
    db::models::credits::{CreditEntryDBResponse, LedgerKind},
    types::GenerationId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditGrantCreate {
    /// Credits to add, must be positive
    pub amount: i64,
    pub description: Option<String>,
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditEntryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub kind: LedgerKind,
    /// Always positive; `kind` gives the direction
    pub amount: i64,
    pub balance_after: i64,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub generation_id: Option<GenerationId>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CreditEntryDBResponse> for CreditEntryResponse {
    fn from(db: CreditEntryDBResponse) -> Self {
        Self {
            id: db.id,
            kind: db.kind,
            amount: db.amount,
            balance_after: db.balance_after,
            generation_id: db.generation_id,
            description: db.description,
            created_at: db.created_at,
        }
    }
}

/// Current balance with one page of the ledger, newest first
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditsResponse {
    pub success: bool,
    pub balance: i64,
    pub data: Vec<CreditEntryResponse>,
    pub total_count: i64,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditGrantResponse {
    pub success: bool,
    pub balance: i64,
    pub entry: CreditEntryResponse,
}
