//! Persisted generation lifecycle: pending row creation, status transitions with
//! credit settlement, and stale expiry.
//!
//! Settlement runs after every successful or already-applied move into a terminal
//! status. The ledger is idempotent per generation, so a repeated `completed` never
//! charges twice and a repeated `failed` never refunds twice.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::settlement;
use super::status::{FailureReason, GenerationStatus, Transition};
use crate::db::errors::DbError;
use crate::db::models::credits::LedgerOutcome;
use crate::db::models::generations::{GenerationCreateDBRequest, GenerationDBResponse, GenerationUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::metrics;
use crate::store::Store;
use crate::types::{GenerationId, UserId, abbrev_uuid};

/// Lost compare-and-swap races tolerated before giving up
const MAX_CAS_ATTEMPTS: usize = 3;

/// Result of [`update_generation_status`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    /// The row after the call
    pub generation: GenerationDBResponse,
    /// Whether this call moved the status, as opposed to finding it already there
    pub applied: bool,
    /// Ledger outcome when the target status settles credits
    pub settlement: Option<LedgerOutcome>,
}

/// Insert a `pending` row
#[instrument(skip(store, request), fields(generation_id = %abbrev_uuid(&request.generation_id), user_id = %abbrev_uuid(&request.user_id)), err)]
pub async fn create_pending_generation(store: &dyn Store, request: &GenerationCreateDBRequest) -> Result<GenerationDBResponse> {
    let row = store.create_generation(request).await.map_err(|e| match e {
        DbError::ForeignKeyViolation { .. } => Error::NotFound {
            resource: "User".to_string(),
            id: request.user_id.to_string(),
        },
        other => Error::Database(other),
    })?;
    info!("Created pending generation");
    Ok(row)
}

async fn load_owned(store: &dyn Store, generation_id: GenerationId, user_id: UserId) -> Result<GenerationDBResponse> {
    store
        .get_generation(generation_id)
        .await?
        .filter(|row| row.user_id == user_id)
        .ok_or_else(|| Error::NotFound {
            resource: "Generation".to_string(),
            id: generation_id.to_string(),
        })
}

/// Move a generation to `to`, writing `update` with it, then settle credits.
///
/// Entering `completed` charges `generation_cost`; entering `failed` refunds any
/// existing charge. If the row is already in `to` the write is skipped but
/// settlement still runs, which completes a settlement interrupted earlier.
#[instrument(skip(store, update), fields(generation_id = %abbrev_uuid(&generation_id), user_id = %abbrev_uuid(&user_id), to = %to), err)]
pub async fn update_generation_status(
    store: &dyn Store,
    generation_cost: i64,
    generation_id: GenerationId,
    user_id: UserId,
    to: GenerationStatus,
    update: &GenerationUpdateDBRequest,
) -> Result<StatusChange> {
    let mut current = load_owned(store, generation_id, user_id).await?;
    let mut written = None;

    for _ in 0..MAX_CAS_ATTEMPTS {
        match current.status.transition(to) {
            Err(invalid) => {
                return Err(Error::Conflict {
                    message: invalid.to_string(),
                    code: "INVALID_TRANSITION".to_string(),
                });
            }
            Ok(Transition::AlreadyApplied) => break,
            Ok(Transition::Apply) => {
                match store
                    .transition_generation(generation_id, GenerationStatus::predecessors(to), to, update)
                    .await?
                {
                    Some(row) => {
                        written = Some(row);
                        break;
                    }
                    None => {
                        debug!(from = %current.status, "Lost status race, re-reading");
                        current = load_owned(store, generation_id, user_id).await?;
                    }
                }
            }
        }
    }

    let (generation, applied) = match written {
        Some(row) => (row, true),
        None if current.status == to => (current, false),
        None => {
            return Err(Error::Conflict {
                message: format!("generation {generation_id} is being updated concurrently"),
                code: "CONCURRENT_UPDATE".to_string(),
            });
        }
    };

    if applied {
        info!(status = %to, "Generation status changed");
        if to.is_terminal() {
            let reason = generation.failure_reason.map(|r| r.as_str()).unwrap_or("none");
            metrics::record_generation_finished(to.as_str(), reason);
        }
    }

    let settlement = match to {
        GenerationStatus::Completed => {
            let outcome = settlement::charge_generation(store, user_id, generation_id, generation_cost).await?;
            if let LedgerOutcome::InsufficientFunds { balance } = outcome {
                // The image was delivered; the balance was spent elsewhere in the meantime.
                warn!(balance, "Generation completed without a charge");
            }
            Some(outcome)
        }
        GenerationStatus::Failed => Some(settlement::refund_generation(store, user_id, generation_id).await?),
        _ => None,
    };

    Ok(StatusChange {
        generation,
        applied,
        settlement,
    })
}

/// Shorthand for failing a generation with a reason and message
pub async fn fail_generation(
    store: &dyn Store,
    generation_cost: i64,
    generation: &GenerationDBResponse,
    reason: FailureReason,
    message: impl Into<String>,
) -> Result<StatusChange> {
    update_generation_status(
        store,
        generation_cost,
        generation.generation_id,
        generation.user_id,
        GenerationStatus::Failed,
        &GenerationUpdateDBRequest::failed(reason, message),
    )
    .await
}

/// Rows created before this instant are stale
pub fn stale_cutoff(now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn timeout_message(stale_after: Duration) -> String {
    let secs = stale_after.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("Generation did not finish within {} minutes", secs / 60)
    } else {
        format!("Generation did not finish within {secs} seconds")
    }
}

/// Fail every stale `pending`/`processing` row, for one user or for everyone.
/// Returns the rows this call moved to `failed`.
#[instrument(skip(store), fields(user_id = ?user_id.as_ref().map(abbrev_uuid)), err)]
pub async fn expire_stale(
    store: &dyn Store,
    generation_cost: i64,
    user_id: Option<UserId>,
    stale_after: Duration,
) -> Result<Vec<GenerationDBResponse>> {
    let cutoff = stale_cutoff(Utc::now(), stale_after);
    let stale = store.find_stale_generations(user_id, cutoff).await?;

    let mut expired = Vec::with_capacity(stale.len());
    for row in stale {
        match fail_generation(store, generation_cost, &row, FailureReason::Timeout, timeout_message(stale_after)).await {
            Ok(change) if change.applied => expired.push(change.generation),
            Ok(_) => {}
            // Finished between the scan and the update
            Err(Error::Conflict { .. }) => {
                debug!(generation_id = %abbrev_uuid(&row.generation_id), "Stale generation finished concurrently");
            }
            Err(e) => return Err(e),
        }
    }

    if !expired.is_empty() {
        info!(count = expired.len(), "Expired stale generations");
    }
    Ok(expired)
}

/// Fail `row` if it is stale, returning the current row either way
pub async fn expire_if_stale(
    store: &dyn Store,
    generation_cost: i64,
    row: GenerationDBResponse,
    stale_after: Duration,
) -> Result<GenerationDBResponse> {
    if row.status.is_terminal() || row.created_at >= stale_cutoff(Utc::now(), stale_after) {
        return Ok(row);
    }

    match fail_generation(store, generation_cost, &row, FailureReason::Timeout, timeout_message(stale_after)).await {
        Ok(change) => Ok(change.generation),
        Err(Error::Conflict { .. }) => load_owned(store, row.generation_id, row.user_id).await,
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::users::UserCreateDBRequest;
    use crate::store::{CreditLedger, GenerationStore, InMemoryStore, UserStore};
    use uuid::Uuid;

    const COST: i64 = 1;

    async fn setup(credits: i64) -> (InMemoryStore, UserId, GenerationDBResponse) {
        let store = InMemoryStore::new();
        let user = store
            .create_user(&UserCreateDBRequest {
                device_id: Uuid::new_v4().to_string(),
                initial_credits: credits,
            })
            .await
            .unwrap();
        let generation = create_pending_generation(
            &store,
            &GenerationCreateDBRequest {
                generation_id: Uuid::new_v4(),
                user_id: user.id,
                original_prompt: "gold necklace on a model".to_string(),
                reference_images: vec!["https://storage.test/ref.jpg".to_string()],
                settings: serde_json::json!({}),
                aspect_ratio: "9:16".to_string(),
            },
        )
        .await
        .unwrap();
        (store, user.id, generation)
    }

    async fn balance(store: &InMemoryStore, user: UserId) -> i64 {
        store.get_user(user).await.unwrap().unwrap().credit_balance
    }

    async fn move_to(store: &InMemoryStore, generation: &GenerationDBResponse, to: GenerationStatus, update: GenerationUpdateDBRequest) -> Result<StatusChange> {
        update_generation_status(store, COST, generation.generation_id, generation.user_id, to, &update).await
    }

    #[tokio::test]
    async fn test_completion_charges_exactly_once() {
        let (store, user, generation) = setup(3).await;
        move_to(&store, &generation, GenerationStatus::Processing, Default::default()).await.unwrap();

        for attempt in 0..4 {
            let change = move_to(
                &store,
                &generation,
                GenerationStatus::Completed,
                GenerationUpdateDBRequest::completed("https://storage.test/out.jpg"),
            )
            .await
            .unwrap();
            assert_eq!(change.applied, attempt == 0);
            assert_eq!(change.generation.status, GenerationStatus::Completed);
            assert!(change.generation.completed_at.is_some());
        }

        assert_eq!(balance(&store, user).await, 2);
        assert_eq!(store.count_entries(user).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failure_after_charge_restores_balance() {
        let (store, user, generation) = setup(2).await;
        move_to(&store, &generation, GenerationStatus::Processing, Default::default()).await.unwrap();
        settlement::charge_generation(&store, user, generation.generation_id, COST).await.unwrap();
        assert_eq!(balance(&store, user).await, 1);

        let change = move_to(
            &store,
            &generation,
            GenerationStatus::Failed,
            GenerationUpdateDBRequest::failed(FailureReason::UpstreamError, "model crashed"),
        )
        .await
        .unwrap();
        assert!(matches!(change.settlement, Some(LedgerOutcome::Applied(_))));
        assert_eq!(balance(&store, user).await, 2);

        let again = move_to(&store, &generation, GenerationStatus::Failed, Default::default()).await.unwrap();
        assert!(!again.applied);
        assert_eq!(again.settlement, Some(LedgerOutcome::AlreadyApplied));
        assert_eq!(balance(&store, user).await, 2);
    }

    #[tokio::test]
    async fn test_failure_without_charge_leaves_balance() {
        let (store, user, generation) = setup(2).await;
        let change = move_to(
            &store,
            &generation,
            GenerationStatus::Failed,
            GenerationUpdateDBRequest::failed(FailureReason::SensitiveContent, "flagged"),
        )
        .await
        .unwrap();
        assert_eq!(change.settlement, Some(LedgerOutcome::NothingToRefund));
        assert_eq!(change.generation.failure_reason, Some(FailureReason::SensitiveContent));
        assert_eq!(balance(&store, user).await, 2);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_conflict() {
        let (store, _, generation) = setup(1).await;
        let err = move_to(
            &store,
            &generation,
            GenerationStatus::Completed,
            GenerationUpdateDBRequest::completed("https://storage.test/out.jpg"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Conflict { ref code, .. } if code == "INVALID_TRANSITION"));

        move_to(&store, &generation, GenerationStatus::Failed, Default::default()).await.unwrap();
        let err = move_to(&store, &generation, GenerationStatus::Processing, Default::default()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { ref code, .. } if code == "INVALID_TRANSITION"));
    }

    #[tokio::test]
    async fn test_other_users_generation_is_not_found() {
        let (store, _, generation) = setup(1).await;
        let err = update_generation_status(
            &store,
            COST,
            generation.generation_id,
            Uuid::new_v4(),
            GenerationStatus::Failed,
            &Default::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_pending_generation_requires_existing_user() {
        let store = InMemoryStore::new();
        let err = create_pending_generation(
            &store,
            &GenerationCreateDBRequest {
                generation_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                original_prompt: "ring".to_string(),
                reference_images: vec![],
                settings: serde_json::json!({}),
                aspect_ratio: "1:1".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, .. } if resource == "User"));
    }

    #[tokio::test]
    async fn test_stale_generations_expire() {
        let (store, user, generation) = setup(2).await;
        let (_, _, fresh) = setup(2).await;
        let stale_after = Duration::from_secs(15 * 60);
        store.backdate_generation(generation.generation_id, Utc::now() - chrono::Duration::minutes(16));

        let expired = expire_stale(&store, COST, Some(user), stale_after).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, GenerationStatus::Failed);
        assert_eq!(expired[0].failure_reason, Some(FailureReason::Timeout));

        assert!(expire_stale(&store, COST, Some(user), stale_after).await.unwrap().is_empty());
        assert_eq!(fresh.status, GenerationStatus::Pending);
        assert_eq!(balance(&store, user).await, 2);
    }

    #[tokio::test]
    async fn test_expire_if_stale_refunds_upfront_charge() {
        let (store, user, generation) = setup(2).await;
        settlement::charge_generation(&store, user, generation.generation_id, COST).await.unwrap();
        move_to(&store, &generation, GenerationStatus::Processing, Default::default()).await.unwrap();
        store.backdate_generation(generation.generation_id, Utc::now() - chrono::Duration::minutes(20));

        let row = store.get_generation(generation.generation_id).await.unwrap().unwrap();
        let row = expire_if_stale(&store, COST, row, Duration::from_secs(15 * 60)).await.unwrap();
        assert_eq!(row.status, GenerationStatus::Failed);
        assert_eq!(balance(&store, user).await, 2);

        let row = expire_if_stale(&store, COST, row, Duration::from_secs(15 * 60)).await.unwrap();
        assert_eq!(row.status, GenerationStatus::Failed);
    }

    #[tokio::test]
    async fn test_fresh_generation_is_left_alone() {
        let (store, _, generation) = setup(1).await;
        let row = expire_if_stale(&store, COST, generation.clone(), Duration::from_secs(15 * 60)).await.unwrap();
        assert_eq!(row, generation);
    }

    #[test]
    fn test_stale_cutoff_saturates() {
        let now = Utc::now();
        assert_eq!(stale_cutoff(now, Duration::from_secs(60)), now - chrono::Duration::seconds(60));
        assert_eq!(stale_cutoff(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
