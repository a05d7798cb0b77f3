//! Database repository for poses, custom poses and hair styles.
//!
//! Catalog rows without a gender, or tagged `unisex`, match every gender filter.

use crate::db::{
    errors::Result,
    models::catalog::{CatalogFilter, CustomPoseCreateDBRequest, CustomPoseDBResponse, HairStyleDBResponse, PoseDBResponse},
};
use crate::types::{PoseId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Catalog<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Catalog<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn list_poses(&mut self, filter: &CatalogFilter) -> Result<Vec<PoseDBResponse>> {
        let rows = sqlx::query_as::<_, PoseDBResponse>(
            r#"
            SELECT * FROM poses
            WHERE is_active
              AND ($1::text IS NULL OR gender IS NULL OR gender = 'unisex' OR gender = $1)
              AND ($2::text IS NULL OR category = $2)
            ORDER BY sort_order, name
            "#,
        )
        .bind(&filter.gender)
        .bind(&filter.category)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self), err)]
    pub async fn list_hair_styles(&mut self, filter: &CatalogFilter) -> Result<Vec<HairStyleDBResponse>> {
        let rows = sqlx::query_as::<_, HairStyleDBResponse>(
            r#"
            SELECT * FROM hair_styles
            WHERE is_active
              AND ($1::text IS NULL OR gender IS NULL OR gender = 'unisex' OR gender = $1)
            ORDER BY sort_order, name
            "#,
        )
        .bind(&filter.gender)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_custom_poses(&mut self, user_id: UserId) -> Result<Vec<CustomPoseDBResponse>> {
        let rows = sqlx::query_as::<_, CustomPoseDBResponse>("SELECT * FROM custom_poses WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create_custom_pose(&mut self, request: &CustomPoseCreateDBRequest) -> Result<CustomPoseDBResponse> {
        let row = sqlx::query_as::<_, CustomPoseDBResponse>(
            r#"
            INSERT INTO custom_poses (id, user_id, name, prompt, thumbnail_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.name)
        .bind(&request.prompt)
        .bind(&request.thumbnail_url)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), pose_id = %abbrev_uuid(&pose_id)), err)]
    pub async fn delete_custom_pose(&mut self, user_id: UserId, pose_id: PoseId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM custom_poses WHERE id = $1 AND user_id = $2")
            .bind(pose_id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
