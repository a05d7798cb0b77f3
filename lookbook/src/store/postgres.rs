//! [`Store`](super::Store) over a Postgres pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{AppLinkStore, CatalogStore, CreditLedger, FavoriteStore, GenerationStore, UserStore};
use crate::db::errors::Result;
use crate::db::handlers::{AppLinks, Catalog, Credits, Favorites, Generations, Users};
use crate::db::models::{
    app_links::{AppLinkDBResponse, AppLinkUpsertDBRequest, Platform},
    catalog::{CatalogFilter, CustomPoseCreateDBRequest, CustomPoseDBResponse, HairStyleDBResponse, PoseDBResponse},
    credits::{CreditEntryDBResponse, CreditGrantDBRequest, GenerationSettlementDBRequest, LedgerOutcome},
    favorites::{FavoriteCreateDBRequest, FavoriteDBResponse},
    generations::{
        GenerationCreateDBRequest, GenerationDBResponse, GenerationUpdateDBRequest, PredictionCreateDBRequest,
        PredictionDBResponse,
    },
    users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
};
use crate::generation::status::GenerationStatus;
use crate::types::{AppLinkId, GenerationId, PoseId, UserId};

#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).create(request).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_by_id(id).await
    }

    async fn get_user_by_device(&self, device_id: &str) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_by_device_id(device_id).await
    }

    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).update(id, request).await
    }
}

#[async_trait]
impl CreditLedger for PostgresStore {
    async fn grant(&self, request: &CreditGrantDBRequest) -> Result<CreditEntryDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Credits::new(&mut conn).grant(request).await
    }

    async fn charge_generation(&self, request: &GenerationSettlementDBRequest) -> Result<LedgerOutcome> {
        let mut conn = self.pool.acquire().await?;
        Credits::new(&mut conn).charge_generation(request).await
    }

    async fn refund_generation(&self, user_id: UserId, generation_id: GenerationId) -> Result<LedgerOutcome> {
        let mut conn = self.pool.acquire().await?;
        Credits::new(&mut conn).refund_generation(user_id, generation_id).await
    }

    async fn list_entries(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditEntryDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Credits::new(&mut conn).list_entries(user_id, skip, limit).await
    }

    async fn count_entries(&self, user_id: UserId) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Credits::new(&mut conn).count_entries(user_id).await
    }
}

#[async_trait]
impl GenerationStore for PostgresStore {
    async fn create_generation(&self, request: &GenerationCreateDBRequest) -> Result<GenerationDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).create(request).await
    }

    async fn get_generation(&self, id: GenerationId) -> Result<Option<GenerationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).get(id).await
    }

    async fn transition_generation(
        &self,
        id: GenerationId,
        from: &[GenerationStatus],
        to: GenerationStatus,
        update: &GenerationUpdateDBRequest,
    ) -> Result<Option<GenerationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).transition(id, from, to, update).await
    }

    async fn attach_prediction(&self, id: GenerationId, prediction_id: &str, model: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).attach_prediction(id, prediction_id, model).await
    }

    async fn list_generations(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<GenerationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).list_for_user(user_id, skip, limit).await
    }

    async fn count_generations(&self, user_id: UserId) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).count_for_user(user_id).await
    }

    async fn list_active_generations(&self, user_id: UserId) -> Result<Vec<GenerationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).list_active(user_id).await
    }

    async fn find_stale_generations(&self, user_id: Option<UserId>, before: DateTime<Utc>) -> Result<Vec<GenerationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).find_stale(user_id, before).await
    }

    async fn delete_generations_older_than(&self, user_id: UserId, before: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).delete_older_than(user_id, before).await
    }

    async fn record_prediction(&self, request: &PredictionCreateDBRequest) -> Result<PredictionDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).record_prediction(request).await
    }

    async fn update_prediction(
        &self,
        prediction_id: &str,
        status: &str,
        output_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<Option<PredictionDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn)
            .update_prediction(prediction_id, status, output_url, error)
            .await
    }

    async fn list_predictions(&self, generation_id: GenerationId) -> Result<Vec<PredictionDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Generations::new(&mut conn).list_predictions(generation_id).await
    }
}

#[async_trait]
impl FavoriteStore for PostgresStore {
    async fn list_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Favorites::new(&mut conn).list(user_id).await
    }

    async fn add_favorite(&self, request: &FavoriteCreateDBRequest) -> Result<FavoriteDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Favorites::new(&mut conn).create(request).await
    }

    async fn remove_favorite(&self, user_id: UserId, location_id: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Favorites::new(&mut conn).delete(user_id, location_id).await
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn list_poses(&self, filter: &CatalogFilter) -> Result<Vec<PoseDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Catalog::new(&mut conn).list_poses(filter).await
    }

    async fn list_hair_styles(&self, filter: &CatalogFilter) -> Result<Vec<HairStyleDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Catalog::new(&mut conn).list_hair_styles(filter).await
    }

    async fn list_custom_poses(&self, user_id: UserId) -> Result<Vec<CustomPoseDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Catalog::new(&mut conn).list_custom_poses(user_id).await
    }

    async fn create_custom_pose(&self, request: &CustomPoseCreateDBRequest) -> Result<CustomPoseDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Catalog::new(&mut conn).create_custom_pose(request).await
    }

    async fn delete_custom_pose(&self, user_id: UserId, pose_id: PoseId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Catalog::new(&mut conn).delete_custom_pose(user_id, pose_id).await
    }
}

#[async_trait]
impl AppLinkStore for PostgresStore {
    async fn get_app_link(&self, platform: Platform, country: &str) -> Result<Option<AppLinkDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        AppLinks::new(&mut conn).get(platform, country).await
    }

    async fn list_app_links(&self, platform: Platform) -> Result<Vec<AppLinkDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        AppLinks::new(&mut conn).list_for_platform(platform).await
    }

    async fn upsert_app_link(&self, request: &AppLinkUpsertDBRequest) -> Result<AppLinkDBResponse> {
        let mut conn = self.pool.acquire().await?;
        AppLinks::new(&mut conn).upsert(request).await
    }

    async fn delete_app_link(&self, id: AppLinkId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        AppLinks::new(&mut conn).delete(id).await
    }
}
