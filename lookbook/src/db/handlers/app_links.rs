//! Database repository for store links.

use crate::db::{
    errors::Result,
    models::app_links::{AppLinkDBResponse, AppLinkUpsertDBRequest, Platform},
};
use crate::types::AppLinkId;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct AppLinks<'c> {
    db: &'c mut PgConnection,
}

impl<'c> AppLinks<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get(&mut self, platform: Platform, country: &str) -> Result<Option<AppLinkDBResponse>> {
        let row = sqlx::query_as::<_, AppLinkDBResponse>("SELECT * FROM app_links WHERE platform = $1 AND country = $2")
            .bind(platform)
            .bind(country)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self), err)]
    pub async fn list_for_platform(&mut self, platform: Platform) -> Result<Vec<AppLinkDBResponse>> {
        let rows = sqlx::query_as::<_, AppLinkDBResponse>("SELECT * FROM app_links WHERE platform = $1 ORDER BY country")
            .bind(platform)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self, request), fields(platform = %request.platform, country = %request.country), err)]
    pub async fn upsert(&mut self, request: &AppLinkUpsertDBRequest) -> Result<AppLinkDBResponse> {
        let row = sqlx::query_as::<_, AppLinkDBResponse>(
            r#"
            INSERT INTO app_links (id, platform, country, url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ON CONSTRAINT app_links_platform_country_key
            DO UPDATE SET url = EXCLUDED.url, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.platform)
        .bind(&request.country)
        .bind(&request.url)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: AppLinkId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM app_links WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
