//! Database models for the credit ledger.

use crate::types::{GenerationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Ledger entry kind stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Grant,
    Charge,
    Refund,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Grant => "grant",
            LedgerKind::Charge => "charge",
            LedgerKind::Refund => "refund",
        }
    }
}

/// Database request for a credit grant
#[derive(Debug, Clone)]
pub struct CreditGrantDBRequest {
    pub user_id: UserId,
    pub amount: i64,
    pub description: Option<String>,
}

/// Database request for charging or refunding a generation
#[derive(Debug, Clone)]
pub struct GenerationSettlementDBRequest {
    pub user_id: UserId,
    pub generation_id: GenerationId,
    pub amount: i64,
}

/// One row of `credit_transactions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CreditEntryDBResponse {
    pub id: Uuid,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub kind: LedgerKind,
    pub amount: i64,
    pub balance_after: i64,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub generation_id: Option<GenerationId>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of applying a ledger operation
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    /// A new entry was appended and the balance moved
    Applied(CreditEntryDBResponse),
    /// An entry with the same idempotency key already exists
    AlreadyApplied,
    /// The charge would take the balance below zero; nothing was written
    InsufficientFunds { balance: i64 },
    /// A refund was requested for a generation that was never charged
    NothingToRefund,
}

impl LedgerOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LedgerOutcome::Applied(_) => "applied",
            LedgerOutcome::AlreadyApplied => "already_applied",
            LedgerOutcome::InsufficientFunds { .. } => "insufficient_funds",
            LedgerOutcome::NothingToRefund => "nothing_to_refund",
        }
    }
}
