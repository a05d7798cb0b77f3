//! Generation status machine.
//!
//! ```text
//! pending ──► processing ──► completed
//!    │             │
//!    └─────────────┴───────► failed
//! ```
//!
//! [`GenerationStatus::transition`] is the only place legal moves are defined. Persisted
//! transitions are compare-and-swap on the predecessor set from
//! [`GenerationStatus::predecessors`], so two racing writers cannot both win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

use crate::db::models::generations::GenerationDBResponse;

/// Status column of a generation row, stored as TEXT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Why a generation ended in `failed`, stored as TEXT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SensitiveContent,
    UpstreamError,
    Timeout,
    Canceled,
    InsufficientCredits,
    Internal,
}

/// Outcome of checking a requested move against the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The move is legal and changes the status
    Apply,
    /// The row is already in the requested terminal status
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move generation from {from} to {to}")]
pub struct InvalidTransition {
    pub from: GenerationStatus,
    pub to: GenerationStatus,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Processing => "processing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }

    /// The single transition function
    pub fn transition(self, to: GenerationStatus) -> Result<Transition, InvalidTransition> {
        use GenerationStatus::*;
        match (self, to) {
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed) => Ok(Transition::Apply),
            (from, to) if from == to && from.is_terminal() => Ok(Transition::AlreadyApplied),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }

    /// Statuses from which `to` may be entered
    pub fn predecessors(to: GenerationStatus) -> &'static [GenerationStatus] {
        use GenerationStatus::*;
        match to {
            Pending => &[],
            Processing => &[Pending],
            Completed => &[Processing],
            Failed => &[Pending, Processing],
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::SensitiveContent => "sensitive_content",
            FailureReason::UpstreamError => "upstream_error",
            FailureReason::Timeout => "timeout",
            FailureReason::Canceled => "canceled",
            FailureReason::InsufficientCredits => "insufficient_credits",
            FailureReason::Internal => "internal",
        }
    }
}

/// Tagged view of a generation row, exposing only the fields meaningful in each state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationState {
    Pending,
    Processing {
        model: Option<String>,
    },
    Completed {
        result_image_url: String,
        model: Option<String>,
        completed_at: Option<DateTime<Utc>>,
    },
    Failed {
        reason: FailureReason,
        message: Option<String>,
    },
}

impl From<&GenerationDBResponse> for GenerationState {
    fn from(row: &GenerationDBResponse) -> Self {
        match row.status {
            GenerationStatus::Pending => GenerationState::Pending,
            GenerationStatus::Processing => GenerationState::Processing { model: row.model.clone() },
            GenerationStatus::Completed => GenerationState::Completed {
                // The schema requires a result URL on completed rows
                result_image_url: row.result_image_url.clone().unwrap_or_default(),
                model: row.model.clone(),
                completed_at: row.completed_at,
            },
            GenerationStatus::Failed => GenerationState::Failed {
                reason: row.failure_reason.unwrap_or(FailureReason::Internal),
                message: row.error_message.clone(),
            },
        }
    }
}
