//! Database repository for generation rows and their prediction attempts.

use crate::db::{
    errors::Result,
    models::generations::{
        GenerationCreateDBRequest, GenerationDBResponse, GenerationUpdateDBRequest, PredictionCreateDBRequest,
        PredictionDBResponse,
    },
};
use crate::generation::status::GenerationStatus;
use crate::types::{GenerationId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

fn status_strings(statuses: &[GenerationStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

pub struct Generations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Generations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(generation_id = %abbrev_uuid(&request.generation_id), user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create(&mut self, request: &GenerationCreateDBRequest) -> Result<GenerationDBResponse> {
        let row = sqlx::query_as::<_, GenerationDBResponse>(
            r#"
            INSERT INTO reference_results (generation_id, user_id, status, original_prompt, reference_images, settings, aspect_ratio)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.generation_id)
        .bind(request.user_id)
        .bind(&request.original_prompt)
        .bind(&request.reference_images)
        .bind(&request.settings)
        .bind(&request.aspect_ratio)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self), fields(generation_id = %abbrev_uuid(&id)), err)]
    pub async fn get(&mut self, id: GenerationId) -> Result<Option<GenerationDBResponse>> {
        let row = sqlx::query_as::<_, GenerationDBResponse>("SELECT * FROM reference_results WHERE generation_id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(row)
    }

    /// Compare-and-swap status change. Returns `None` when the row is missing or its status
    /// is not one of `from`; nothing is written in that case.
    #[instrument(skip(self, update), fields(generation_id = %abbrev_uuid(&id), to = %to), err)]
    pub async fn transition(
        &mut self,
        id: GenerationId,
        from: &[GenerationStatus],
        to: GenerationStatus,
        update: &GenerationUpdateDBRequest,
    ) -> Result<Option<GenerationDBResponse>> {
        let row = sqlx::query_as::<_, GenerationDBResponse>(
            r#"
            UPDATE reference_results SET
                status = $2,
                enhanced_prompt = COALESCE($3, enhanced_prompt),
                model = COALESCE($4, model),
                prediction_id = COALESCE($5, prediction_id),
                result_image_url = COALESCE($6, result_image_url),
                failure_reason = COALESCE($7, failure_reason),
                error_message = COALESCE($8, error_message),
                updated_at = NOW(),
                completed_at = CASE WHEN $9 THEN NOW() ELSE completed_at END
            WHERE generation_id = $1 AND status = ANY($10::text[])
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(&update.enhanced_prompt)
        .bind(&update.model)
        .bind(&update.prediction_id)
        .bind(&update.result_image_url)
        .bind(update.failure_reason)
        .bind(&update.error_message)
        .bind(to.is_terminal())
        .bind(status_strings(from))
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(row)
    }

    /// Point a processing row at the prediction currently serving it
    #[instrument(skip(self), fields(generation_id = %abbrev_uuid(&id)), err)]
    pub async fn attach_prediction(&mut self, id: GenerationId, prediction_id: &str, model: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reference_results
            SET prediction_id = $2, model = $3, updated_at = NOW()
            WHERE generation_id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(prediction_id)
        .bind(model)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Newest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<GenerationDBResponse>> {
        let rows = sqlx::query_as::<_, GenerationDBResponse>(
            r#"
            SELECT * FROM reference_results
            WHERE user_id = $1
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    pub async fn count_for_user(&mut self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reference_results WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_active(&mut self, user_id: UserId) -> Result<Vec<GenerationDBResponse>> {
        let rows = sqlx::query_as::<_, GenerationDBResponse>(
            r#"
            SELECT * FROM reference_results
            WHERE user_id = $1 AND status IN ('pending', 'processing')
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    /// Non-terminal rows created before `before`, optionally for one user
    #[instrument(skip(self), err)]
    pub async fn find_stale(&mut self, user_id: Option<UserId>, before: DateTime<Utc>) -> Result<Vec<GenerationDBResponse>> {
        let rows = sqlx::query_as::<_, GenerationDBResponse>(
            r#"
            SELECT * FROM reference_results
            WHERE status IN ('pending', 'processing')
              AND created_at < $1
              AND ($2::uuid IS NULL OR user_id = $2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(before)
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    /// Delete a user's terminal rows created before `before`
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn delete_older_than(&mut self, user_id: UserId, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM reference_results
            WHERE user_id = $1
              AND status IN ('completed', 'failed')
              AND created_at < $2
            "#,
        )
        .bind(user_id)
        .bind(before)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, request), fields(prediction_id = %request.id), err)]
    pub async fn record_prediction(&mut self, request: &PredictionCreateDBRequest) -> Result<PredictionDBResponse> {
        let row = sqlx::query_as::<_, PredictionDBResponse>(
            r#"
            INSERT INTO predictions (id, generation_id, user_id, model, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&request.id)
        .bind(request.generation_id)
        .bind(request.user_id)
        .bind(&request.model)
        .bind(&request.status)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self, output_url, error), err)]
    pub async fn update_prediction(
        &mut self,
        prediction_id: &str,
        status: &str,
        output_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<Option<PredictionDBResponse>> {
        let row = sqlx::query_as::<_, PredictionDBResponse>(
            r#"
            UPDATE predictions SET
                status = $2,
                output_url = COALESCE($3, output_url),
                error = COALESCE($4, error),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(prediction_id)
        .bind(status)
        .bind(output_url)
        .bind(error)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(row)
    }

    pub async fn list_predictions(&mut self, generation_id: GenerationId) -> Result<Vec<PredictionDBResponse>> {
        let rows = sqlx::query_as::<_, PredictionDBResponse>("SELECT * FROM predictions WHERE generation_id = $1 ORDER BY created_at")
            .bind(generation_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(rows)
    }
}
