//! Database repository for the append-only credit ledger.
//!
//! Every operation locks the user row (`SELECT ... FOR UPDATE`) before checking idempotency,
//! so concurrent operations on the same user are serialized and a charge or refund for a
//! generation is written at most once. The partial unique index on
//! `(generation_id, kind)` backs this up at the schema level.

use crate::db::{
    errors::{DbError, Result},
    models::credits::{
        CreditEntryDBResponse, CreditGrantDBRequest, GenerationSettlementDBRequest, LedgerKind, LedgerOutcome,
    },
};
use crate::types::{GenerationId, UserId, abbrev_uuid};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

const GENERATION_KIND_KEY: &str = "credit_transactions_generation_kind_key";

pub struct Credits<'c> {
    db: &'c mut PgConnection,
}

/// Lock the user row and return its balance
async fn lock_balance(conn: &mut PgConnection, user_id: UserId) -> Result<i64> {
    let balance: Option<i64> = sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    balance.ok_or(DbError::NotFound)
}

async fn find_entry(conn: &mut PgConnection, generation_id: GenerationId, kind: LedgerKind) -> Result<Option<CreditEntryDBResponse>> {
    let entry = sqlx::query_as::<_, CreditEntryDBResponse>("SELECT * FROM credit_transactions WHERE generation_id = $1 AND kind = $2")
        .bind(generation_id)
        .bind(kind)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(entry)
}

/// Move the balance and append the matching entry
async fn append(
    conn: &mut PgConnection,
    user_id: UserId,
    kind: LedgerKind,
    amount: i64,
    balance_after: i64,
    generation_id: Option<GenerationId>,
    description: Option<&str>,
) -> Result<CreditEntryDBResponse> {
    sqlx::query("UPDATE users SET credit_balance = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(balance_after)
        .execute(&mut *conn)
        .await?;

    let entry = sqlx::query_as::<_, CreditEntryDBResponse>(
        r#"
        INSERT INTO credit_transactions (id, user_id, kind, amount, balance_after, generation_id, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(kind)
    .bind(amount)
    .bind(balance_after)
    .bind(generation_id)
    .bind(description)
    .fetch_one(&mut *conn)
    .await?;
    Ok(entry)
}

impl<'c> Credits<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), amount = request.amount), err)]
    pub async fn grant(&mut self, request: &CreditGrantDBRequest) -> Result<CreditEntryDBResponse> {
        let mut tx = self.db.begin().await?;
        let balance = lock_balance(&mut tx, request.user_id).await?;
        let entry = append(
            &mut tx,
            request.user_id,
            LedgerKind::Grant,
            request.amount,
            balance + request.amount,
            None,
            request.description.as_deref(),
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Charge a generation once. Re-running returns [`LedgerOutcome::AlreadyApplied`].
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), generation_id = %abbrev_uuid(&request.generation_id)), err)]
    pub async fn charge_generation(&mut self, request: &GenerationSettlementDBRequest) -> Result<LedgerOutcome> {
        let mut tx = self.db.begin().await?;
        let balance = lock_balance(&mut tx, request.user_id).await?;

        if find_entry(&mut tx, request.generation_id, LedgerKind::Charge).await?.is_some() {
            return Ok(LedgerOutcome::AlreadyApplied);
        }
        if balance < request.amount {
            return Ok(LedgerOutcome::InsufficientFunds { balance });
        }

        let appended = append(
            &mut tx,
            request.user_id,
            LedgerKind::Charge,
            request.amount,
            balance - request.amount,
            Some(request.generation_id),
            Some("Generation charge"),
        )
        .await;

        match appended {
            Ok(entry) => {
                tx.commit().await?;
                Ok(LedgerOutcome::Applied(entry))
            }
            Err(e) if e.is_unique_violation(Some(GENERATION_KIND_KEY)) => Ok(LedgerOutcome::AlreadyApplied),
            Err(e) => Err(e),
        }
    }

    /// Refund the amount actually charged for a generation, at most once
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), generation_id = %abbrev_uuid(&generation_id)), err)]
    pub async fn refund_generation(&mut self, user_id: UserId, generation_id: GenerationId) -> Result<LedgerOutcome> {
        let mut tx = self.db.begin().await?;
        let balance = lock_balance(&mut tx, user_id).await?;

        let Some(charge) = find_entry(&mut tx, generation_id, LedgerKind::Charge).await? else {
            return Ok(LedgerOutcome::NothingToRefund);
        };
        if find_entry(&mut tx, generation_id, LedgerKind::Refund).await?.is_some() {
            return Ok(LedgerOutcome::AlreadyApplied);
        }

        let appended = append(
            &mut tx,
            user_id,
            LedgerKind::Refund,
            charge.amount,
            balance + charge.amount,
            Some(generation_id),
            Some("Generation refund"),
        )
        .await;

        match appended {
            Ok(entry) => {
                tx.commit().await?;
                Ok(LedgerOutcome::Applied(entry))
            }
            Err(e) if e.is_unique_violation(Some(GENERATION_KIND_KEY)) => Ok(LedgerOutcome::AlreadyApplied),
            Err(e) => Err(e),
        }
    }

    /// Newest entries first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_entries(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditEntryDBResponse>> {
        let entries = sqlx::query_as::<_, CreditEntryDBResponse>(
            r#"
            SELECT * FROM credit_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(entries)
    }

    pub async fn count_entries(&mut self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}
