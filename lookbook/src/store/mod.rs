//! Storage seam between services and persistence.
//!
//! Services and handlers talk to an `Arc<dyn Store>`. [`PostgresStore`] is the
//! production implementation over the repositories in [`crate::db::handlers`];
//! `InMemoryStore` (tests and the `test-utils` feature) honours the same contracts,
//! including unique violations and compare-and-swap transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::errors::Result;
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

#[cfg(any(test, feature = "test-utils"))]
pub mod in_memory;
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user and grant `initial_credits` atomically.
    /// A duplicate device is a unique violation on `users_device_id_key`.
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;
    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>>;
    async fn get_user_by_device(&self, device_id: &str) -> Result<Option<UserDBResponse>>;
    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<Option<UserDBResponse>>;
}

/// Append-only credit ledger. Charges and refunds are keyed by generation and applied at most once.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn grant(&self, request: &CreditGrantDBRequest) -> Result<CreditEntryDBResponse>;
    async fn charge_generation(&self, request: &GenerationSettlementDBRequest) -> Result<LedgerOutcome>;
    /// Refund exactly the charged amount, only if a charge exists and was not refunded yet
    async fn refund_generation(&self, user_id: UserId, generation_id: GenerationId) -> Result<LedgerOutcome>;
    async fn list_entries(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditEntryDBResponse>>;
    async fn count_entries(&self, user_id: UserId) -> Result<i64>;
}

#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn create_generation(&self, request: &GenerationCreateDBRequest) -> Result<GenerationDBResponse>;
    async fn get_generation(&self, id: GenerationId) -> Result<Option<GenerationDBResponse>>;
    /// Compare-and-swap: writes only when the current status is in `from`
    async fn transition_generation(
        &self,
        id: GenerationId,
        from: &[GenerationStatus],
        to: GenerationStatus,
        update: &GenerationUpdateDBRequest,
    ) -> Result<Option<GenerationDBResponse>>;
    async fn attach_prediction(&self, id: GenerationId, prediction_id: &str, model: &str) -> Result<bool>;
    async fn list_generations(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<GenerationDBResponse>>;
    async fn count_generations(&self, user_id: UserId) -> Result<i64>;
    async fn list_active_generations(&self, user_id: UserId) -> Result<Vec<GenerationDBResponse>>;
    async fn find_stale_generations(&self, user_id: Option<UserId>, before: DateTime<Utc>) -> Result<Vec<GenerationDBResponse>>;
    async fn delete_generations_older_than(&self, user_id: UserId, before: DateTime<Utc>) -> Result<u64>;
    async fn record_prediction(&self, request: &PredictionCreateDBRequest) -> Result<PredictionDBResponse>;
    async fn update_prediction(
        &self,
        prediction_id: &str,
        status: &str,
        output_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<Option<PredictionDBResponse>>;
    async fn list_predictions(&self, generation_id: GenerationId) -> Result<Vec<PredictionDBResponse>>;
}

#[async_trait]
pub trait FavoriteStore: Send + Sync {
    async fn list_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteDBResponse>>;
    /// A duplicate `(user_id, location_id)` is a unique violation on
    /// [`FAVORITE_UNIQUE_CONSTRAINT`](crate::db::handlers::favorites::FAVORITE_UNIQUE_CONSTRAINT)
    async fn add_favorite(&self, request: &FavoriteCreateDBRequest) -> Result<FavoriteDBResponse>;
    async fn remove_favorite(&self, user_id: UserId, location_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_poses(&self, filter: &CatalogFilter) -> Result<Vec<PoseDBResponse>>;
    async fn list_hair_styles(&self, filter: &CatalogFilter) -> Result<Vec<HairStyleDBResponse>>;
    async fn list_custom_poses(&self, user_id: UserId) -> Result<Vec<CustomPoseDBResponse>>;
    async fn create_custom_pose(&self, request: &CustomPoseCreateDBRequest) -> Result<CustomPoseDBResponse>;
    async fn delete_custom_pose(&self, user_id: UserId, pose_id: PoseId) -> Result<bool>;
}

#[async_trait]
pub trait AppLinkStore: Send + Sync {
    async fn get_app_link(&self, platform: Platform, country: &str) -> Result<Option<AppLinkDBResponse>>;
    async fn list_app_links(&self, platform: Platform) -> Result<Vec<AppLinkDBResponse>>;
    async fn upsert_app_link(&self, request: &AppLinkUpsertDBRequest) -> Result<AppLinkDBResponse>;
    async fn delete_app_link(&self, id: AppLinkId) -> Result<bool>;
}

/// Everything the application persists
pub trait Store: UserStore + CreditLedger + GenerationStore + FavoriteStore + CatalogStore + AppLinkStore {}

impl<T> Store for T where T: UserStore + CreditLedger + GenerationStore + FavoriteStore + CatalogStore + AppLinkStore {}
