//! Credit settlement for generations.
//!
//! Both operations are keyed by generation in the ledger, so calling them again for
//! the same generation never moves the balance twice.

use tracing::{info, instrument, warn};

use crate::db::errors::Result;
use crate::db::models::credits::{GenerationSettlementDBRequest, LedgerKind, LedgerOutcome};
use crate::metrics;
use crate::store::Store;
use crate::types::{GenerationId, UserId, abbrev_uuid};

/// Charge `amount` credits for a generation, at most once
#[instrument(skip(store), fields(user_id = %abbrev_uuid(&user_id), generation_id = %abbrev_uuid(&generation_id)), err)]
pub async fn charge_generation(store: &dyn Store, user_id: UserId, generation_id: GenerationId, amount: i64) -> Result<LedgerOutcome> {
    let outcome = store
        .charge_generation(&GenerationSettlementDBRequest {
            user_id,
            generation_id,
            amount,
        })
        .await?;
    metrics::record_ledger_entry(LedgerKind::Charge.as_str(), outcome.label());

    match &outcome {
        LedgerOutcome::Applied(entry) => info!(amount, balance_after = entry.balance_after, "Charged generation"),
        LedgerOutcome::AlreadyApplied => info!("Generation already charged"),
        LedgerOutcome::InsufficientFunds { balance } => warn!(amount, balance, "Insufficient credits to charge generation"),
        LedgerOutcome::NothingToRefund => {}
    }
    Ok(outcome)
}

/// Refund the charge of a generation, if there is one that was not refunded yet
#[instrument(skip(store), fields(user_id = %abbrev_uuid(&user_id), generation_id = %abbrev_uuid(&generation_id)), err)]
pub async fn refund_generation(store: &dyn Store, user_id: UserId, generation_id: GenerationId) -> Result<LedgerOutcome> {
    let outcome = store.refund_generation(user_id, generation_id).await?;
    metrics::record_ledger_entry(LedgerKind::Refund.as_str(), outcome.label());

    match &outcome {
        LedgerOutcome::Applied(entry) => info!(
            amount = entry.amount,
            balance_after = entry.balance_after,
            "Refunded generation"
        ),
        LedgerOutcome::AlreadyApplied => info!("Generation already refunded"),
        _ => {}
    }
    Ok(outcome)
}
