//! Database repository for favourite locations.

use crate::db::{
    errors::Result,
    models::favorites::{FavoriteCreateDBRequest, FavoriteDBResponse},
};
use crate::types::{UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

/// Unique constraint guarding one favourite per (user, location)
pub const FAVORITE_UNIQUE_CONSTRAINT: &str = "user_favorite_locations_user_location_key";

pub struct Favorites<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Favorites<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list(&mut self, user_id: UserId) -> Result<Vec<FavoriteDBResponse>> {
        let rows = sqlx::query_as::<_, FavoriteDBResponse>(
            "SELECT * FROM user_favorite_locations WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    /// Fails with a unique violation on [`FAVORITE_UNIQUE_CONSTRAINT`] for duplicates
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), location_id = %request.location_id), err)]
    pub async fn create(&mut self, request: &FavoriteCreateDBRequest) -> Result<FavoriteDBResponse> {
        let row = sqlx::query_as::<_, FavoriteDBResponse>(
            r#"
            INSERT INTO user_favorite_locations (id, user_id, location_id, location_name, location_data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.location_id)
        .bind(&request.location_name)
        .bind(&request.location_data)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn delete(&mut self, user_id: UserId, location_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_favorite_locations WHERE user_id = $1 AND location_id = $2")
            .bind(user_id)
            .bind(location_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
