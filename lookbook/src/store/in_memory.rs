//! In-memory [`Store`](super::Store) for tests.
//!
//! All state sits behind one lock, so every operation is atomic the same way a single
//! Postgres transaction is. Unique constraints are reported with the same constraint
//! names the migrations declare.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{AppLinkStore, CatalogStore, CreditLedger, FavoriteStore, GenerationStore, UserStore};
use crate::db::errors::{DbError, Result};
use crate::db::handlers::favorites::FAVORITE_UNIQUE_CONSTRAINT;
use crate::db::models::{
    app_links::{AppLinkDBResponse, AppLinkUpsertDBRequest, Platform},
    catalog::{CatalogFilter, CustomPoseCreateDBRequest, CustomPoseDBResponse, HairStyleDBResponse, PoseDBResponse},
    credits::{CreditEntryDBResponse, CreditGrantDBRequest, GenerationSettlementDBRequest, LedgerKind, LedgerOutcome},
    favorites::{FavoriteCreateDBRequest, FavoriteDBResponse},
    generations::{
        GenerationCreateDBRequest, GenerationDBResponse, GenerationUpdateDBRequest, PredictionCreateDBRequest,
        PredictionDBResponse,
    },
    users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
};
use crate::generation::status::GenerationStatus;
use crate::types::{AppLinkId, GenerationId, PoseId, UserId};

#[derive(Default)]
struct State {
    users: HashMap<UserId, UserDBResponse>,
    /// Chronological
    ledger: Vec<CreditEntryDBResponse>,
    generations: HashMap<GenerationId, GenerationDBResponse>,
    predictions: HashMap<String, PredictionDBResponse>,
    favorites: Vec<FavoriteDBResponse>,
    poses: Vec<PoseDBResponse>,
    hair_styles: Vec<HairStyleDBResponse>,
    custom_poses: Vec<CustomPoseDBResponse>,
    app_links: Vec<AppLinkDBResponse>,
}

fn unique_violation(constraint: &str, table: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        table: Some(table.to_string()),
        message: format!("duplicate key value violates unique constraint \"{constraint}\""),
    }
}

fn foreign_key_violation(constraint: &str, table: &str) -> DbError {
    DbError::ForeignKeyViolation {
        constraint: Some(constraint.to_string()),
        table: Some(table.to_string()),
        message: format!("insert or update on table \"{table}\" violates foreign key constraint \"{constraint}\""),
    }
}

fn gender_matches(filter: &Option<String>, gender: &Option<String>) -> bool {
    match (filter, gender) {
        (None, _) | (_, None) => true,
        (Some(wanted), Some(gender)) => gender == wanted || gender == "unisex",
    }
}

impl State {
    fn find_entry(&self, generation_id: GenerationId, kind: LedgerKind) -> Option<&CreditEntryDBResponse> {
        self.ledger
            .iter()
            .find(|e| e.generation_id == Some(generation_id) && e.kind == kind)
    }

    fn append(
        &mut self,
        user_id: UserId,
        kind: LedgerKind,
        amount: i64,
        generation_id: Option<GenerationId>,
        description: Option<String>,
    ) -> Result<CreditEntryDBResponse> {
        let user = self.users.get_mut(&user_id).ok_or(DbError::NotFound)?;
        let balance_after = match kind {
            LedgerKind::Grant | LedgerKind::Refund => user.credit_balance + amount,
            LedgerKind::Charge => user.credit_balance - amount,
        };
        if balance_after < 0 {
            return Err(DbError::CheckViolation {
                constraint: Some("users_credit_balance_non_negative".to_string()),
                table: Some("users".to_string()),
                message: "credit balance cannot be negative".to_string(),
            });
        }
        let now = Utc::now();
        user.credit_balance = balance_after;
        user.updated_at = now;

        let entry = CreditEntryDBResponse {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            balance_after,
            generation_id,
            description,
            created_at: now,
        };
        self.ledger.push(entry.clone());
        Ok(entry)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a generation's creation time, for exercising stale expiry
    pub fn backdate_generation(&self, id: GenerationId, created_at: DateTime<Utc>) {
        if let Some(row) = self.state.lock().generations.get_mut(&id) {
            row.created_at = created_at;
        }
    }

    pub fn seed_pose(&self, name: &str, gender: Option<&str>, category: Option<&str>) -> PoseDBResponse {
        let mut state = self.state.lock();
        let pose = PoseDBResponse {
            id: Uuid::new_v4(),
            name: name.to_string(),
            gender: gender.map(str::to_string),
            category: category.map(str::to_string),
            prompt: format!("{name} pose"),
            thumbnail_url: None,
            sort_order: state.poses.len() as i32,
            is_active: true,
            created_at: Utc::now(),
        };
        state.poses.push(pose.clone());
        pose
    }

    pub fn seed_hair_style(&self, name: &str, gender: Option<&str>) -> HairStyleDBResponse {
        let mut state = self.state.lock();
        let style = HairStyleDBResponse {
            id: Uuid::new_v4(),
            name: name.to_string(),
            gender: gender.map(str::to_string),
            prompt: format!("{name} hair"),
            thumbnail_url: None,
            sort_order: state.hair_styles.len() as i32,
            is_active: true,
            created_at: Utc::now(),
        };
        state.hair_styles.push(style.clone());
        style
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut state = self.state.lock();
        if state.users.values().any(|u| u.device_id == request.device_id) {
            return Err(unique_violation("users_device_id_key", "users"));
        }
        let now = Utc::now();
        let user = UserDBResponse {
            id: Uuid::new_v4(),
            device_id: request.device_id.clone(),
            credit_balance: 0,
            is_pro: false,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        if request.initial_credits > 0 {
            state.append(
                user.id,
                LedgerKind::Grant,
                request.initial_credits,
                None,
                Some("Welcome credits".to_string()),
            )?;
        }
        state.users.get(&user.id).cloned().ok_or(DbError::NotFound)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn get_user_by_device(&self, device_id: &str) -> Result<Option<UserDBResponse>> {
        Ok(self.state.lock().users.values().find(|u| u.device_id == device_id).cloned())
    }

    async fn update_user(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<Option<UserDBResponse>> {
        let mut state = self.state.lock();
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(is_pro) = request.is_pro {
            user.is_pro = is_pro;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl CreditLedger for InMemoryStore {
    async fn grant(&self, request: &CreditGrantDBRequest) -> Result<CreditEntryDBResponse> {
        self.state.lock().append(
            request.user_id,
            LedgerKind::Grant,
            request.amount,
            None,
            request.description.clone(),
        )
    }

    async fn charge_generation(&self, request: &GenerationSettlementDBRequest) -> Result<LedgerOutcome> {
        let mut state = self.state.lock();
        let balance = state.users.get(&request.user_id).ok_or(DbError::NotFound)?.credit_balance;
        if state.find_entry(request.generation_id, LedgerKind::Charge).is_some() {
            return Ok(LedgerOutcome::AlreadyApplied);
        }
        if balance < request.amount {
            return Ok(LedgerOutcome::InsufficientFunds { balance });
        }
        let entry = state.append(
            request.user_id,
            LedgerKind::Charge,
            request.amount,
            Some(request.generation_id),
            Some("Generation charge".to_string()),
        )?;
        Ok(LedgerOutcome::Applied(entry))
    }

    async fn refund_generation(&self, user_id: UserId, generation_id: GenerationId) -> Result<LedgerOutcome> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&user_id) {
            return Err(DbError::NotFound);
        }
        let Some(charged) = state.find_entry(generation_id, LedgerKind::Charge).map(|e| e.amount) else {
            return Ok(LedgerOutcome::NothingToRefund);
        };
        if state.find_entry(generation_id, LedgerKind::Refund).is_some() {
            return Ok(LedgerOutcome::AlreadyApplied);
        }
        let entry = state.append(
            user_id,
            LedgerKind::Refund,
            charged,
            Some(generation_id),
            Some("Generation refund".to_string()),
        )?;
        Ok(LedgerOutcome::Applied(entry))
    }

    async fn list_entries(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditEntryDBResponse>> {
        Ok(self
            .state
            .lock()
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_entries(&self, user_id: UserId) -> Result<i64> {
        Ok(self.state.lock().ledger.iter().filter(|e| e.user_id == user_id).count() as i64)
    }
}

fn newest_first(mut rows: Vec<GenerationDBResponse>) -> Vec<GenerationDBResponse> {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait]
impl GenerationStore for InMemoryStore {
    async fn create_generation(&self, request: &GenerationCreateDBRequest) -> Result<GenerationDBResponse> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&request.user_id) {
            return Err(foreign_key_violation("reference_results_user_id_fkey", "reference_results"));
        }
        if state.generations.contains_key(&request.generation_id) {
            return Err(unique_violation("reference_results_pkey", "reference_results"));
        }
        let now = Utc::now();
        let row = GenerationDBResponse {
            generation_id: request.generation_id,
            user_id: request.user_id,
            status: GenerationStatus::Pending,
            original_prompt: request.original_prompt.clone(),
            enhanced_prompt: None,
            result_image_url: None,
            reference_images: request.reference_images.clone(),
            settings: request.settings.clone(),
            aspect_ratio: request.aspect_ratio.clone(),
            model: None,
            prediction_id: None,
            failure_reason: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.generations.insert(row.generation_id, row.clone());
        Ok(row)
    }

    async fn get_generation(&self, id: GenerationId) -> Result<Option<GenerationDBResponse>> {
        Ok(self.state.lock().generations.get(&id).cloned())
    }

    async fn transition_generation(
        &self,
        id: GenerationId,
        from: &[GenerationStatus],
        to: GenerationStatus,
        update: &GenerationUpdateDBRequest,
    ) -> Result<Option<GenerationDBResponse>> {
        let mut state = self.state.lock();
        let Some(row) = state.generations.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&row.status) {
            return Ok(None);
        }
        if to == GenerationStatus::Completed && row.result_image_url.is_none() && update.result_image_url.is_none() {
            return Err(DbError::CheckViolation {
                constraint: Some("reference_results_completed_has_result".to_string()),
                table: Some("reference_results".to_string()),
                message: "completed generation requires a result image".to_string(),
            });
        }

        let now = Utc::now();
        row.status = to;
        if let Some(v) = &update.enhanced_prompt {
            row.enhanced_prompt = Some(v.clone());
        }
        if let Some(v) = &update.model {
            row.model = Some(v.clone());
        }
        if let Some(v) = &update.prediction_id {
            row.prediction_id = Some(v.clone());
        }
        if let Some(v) = &update.result_image_url {
            row.result_image_url = Some(v.clone());
        }
        if let Some(v) = update.failure_reason {
            row.failure_reason = Some(v);
        }
        if let Some(v) = &update.error_message {
            row.error_message = Some(v.clone());
        }
        row.updated_at = now;
        if to.is_terminal() {
            row.completed_at = Some(now);
        }
        Ok(Some(row.clone()))
    }

    async fn attach_prediction(&self, id: GenerationId, prediction_id: &str, model: &str) -> Result<bool> {
        let mut state = self.state.lock();
        match state.generations.get_mut(&id) {
            Some(row) if row.status == GenerationStatus::Processing => {
                row.prediction_id = Some(prediction_id.to_string());
                row.model = Some(model.to_string());
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_generations(&self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<GenerationDBResponse>> {
        let rows = self
            .state
            .lock()
            .generations
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows)
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_generations(&self, user_id: UserId) -> Result<i64> {
        Ok(self.state.lock().generations.values().filter(|g| g.user_id == user_id).count() as i64)
    }

    async fn list_active_generations(&self, user_id: UserId) -> Result<Vec<GenerationDBResponse>> {
        let rows = self
            .state
            .lock()
            .generations
            .values()
            .filter(|g| g.user_id == user_id && !g.status.is_terminal())
            .cloned()
            .collect();
        Ok(newest_first(rows))
    }

    async fn find_stale_generations(&self, user_id: Option<UserId>, before: DateTime<Utc>) -> Result<Vec<GenerationDBResponse>> {
        let mut rows: Vec<_> = self
            .state
            .lock()
            .generations
            .values()
            .filter(|g| !g.status.is_terminal() && g.created_at < before && user_id.is_none_or(|u| g.user_id == u))
            .cloned()
            .collect();
        rows.sort_by_key(|g| g.created_at);
        Ok(rows)
    }

    async fn delete_generations_older_than(&self, user_id: UserId, before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock();
        let doomed: Vec<GenerationId> = state
            .generations
            .values()
            .filter(|g| g.user_id == user_id && g.status.is_terminal() && g.created_at < before)
            .map(|g| g.generation_id)
            .collect();
        for id in &doomed {
            state.generations.remove(id);
        }
        state.predictions.retain(|_, p| !doomed.contains(&p.generation_id));
        Ok(doomed.len() as u64)
    }

    async fn record_prediction(&self, request: &PredictionCreateDBRequest) -> Result<PredictionDBResponse> {
        let mut state = self.state.lock();
        if !state.generations.contains_key(&request.generation_id) {
            return Err(foreign_key_violation("predictions_generation_id_fkey", "predictions"));
        }
        let now = Utc::now();
        let row = state
            .predictions
            .entry(request.id.clone())
            .and_modify(|p| {
                p.status = request.status.clone();
                p.updated_at = now;
            })
            .or_insert_with(|| PredictionDBResponse {
                id: request.id.clone(),
                generation_id: request.generation_id,
                user_id: request.user_id,
                model: request.model.clone(),
                status: request.status.clone(),
                output_url: None,
                error: None,
                created_at: now,
                updated_at: now,
            });
        Ok(row.clone())
    }

    async fn update_prediction(
        &self,
        prediction_id: &str,
        status: &str,
        output_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<Option<PredictionDBResponse>> {
        let mut state = self.state.lock();
        let Some(row) = state.predictions.get_mut(prediction_id) else {
            return Ok(None);
        };
        row.status = status.to_string();
        if let Some(url) = output_url {
            row.output_url = Some(url.to_string());
        }
        if let Some(error) = error {
            row.error = Some(error.to_string());
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn list_predictions(&self, generation_id: GenerationId) -> Result<Vec<PredictionDBResponse>> {
        let mut rows: Vec<_> = self
            .state
            .lock()
            .predictions
            .values()
            .filter(|p| p.generation_id == generation_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }
}

#[async_trait]
impl FavoriteStore for InMemoryStore {
    async fn list_favorites(&self, user_id: UserId) -> Result<Vec<FavoriteDBResponse>> {
        Ok(self
            .state
            .lock()
            .favorites
            .iter()
            .rev()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn add_favorite(&self, request: &FavoriteCreateDBRequest) -> Result<FavoriteDBResponse> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&request.user_id) {
            return Err(foreign_key_violation(
                "user_favorite_locations_user_id_fkey",
                "user_favorite_locations",
            ));
        }
        if state
            .favorites
            .iter()
            .any(|f| f.user_id == request.user_id && f.location_id == request.location_id)
        {
            return Err(unique_violation(FAVORITE_UNIQUE_CONSTRAINT, "user_favorite_locations"));
        }
        let favorite = FavoriteDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            location_id: request.location_id.clone(),
            location_name: request.location_name.clone(),
            location_data: request.location_data.clone(),
            created_at: Utc::now(),
        };
        state.favorites.push(favorite.clone());
        Ok(favorite)
    }

    async fn remove_favorite(&self, user_id: UserId, location_id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.favorites.len();
        state
            .favorites
            .retain(|f| !(f.user_id == user_id && f.location_id == location_id));
        Ok(state.favorites.len() < before)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn list_poses(&self, filter: &CatalogFilter) -> Result<Vec<PoseDBResponse>> {
        Ok(self
            .state
            .lock()
            .poses
            .iter()
            .filter(|p| p.is_active && gender_matches(&filter.gender, &p.gender))
            .filter(|p| filter.category.is_none() || filter.category == p.category)
            .cloned()
            .collect())
    }

    async fn list_hair_styles(&self, filter: &CatalogFilter) -> Result<Vec<HairStyleDBResponse>> {
        Ok(self
            .state
            .lock()
            .hair_styles
            .iter()
            .filter(|h| h.is_active && gender_matches(&filter.gender, &h.gender))
            .cloned()
            .collect())
    }

    async fn list_custom_poses(&self, user_id: UserId) -> Result<Vec<CustomPoseDBResponse>> {
        Ok(self
            .state
            .lock()
            .custom_poses
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_custom_pose(&self, request: &CustomPoseCreateDBRequest) -> Result<CustomPoseDBResponse> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&request.user_id) {
            return Err(foreign_key_violation("custom_poses_user_id_fkey", "custom_poses"));
        }
        let pose = CustomPoseDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            name: request.name.clone(),
            prompt: request.prompt.clone(),
            thumbnail_url: request.thumbnail_url.clone(),
            created_at: Utc::now(),
        };
        state.custom_poses.push(pose.clone());
        Ok(pose)
    }

    async fn delete_custom_pose(&self, user_id: UserId, pose_id: PoseId) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.custom_poses.len();
        state.custom_poses.retain(|p| !(p.id == pose_id && p.user_id == user_id));
        Ok(state.custom_poses.len() < before)
    }
}

#[async_trait]
impl AppLinkStore for InMemoryStore {
    async fn get_app_link(&self, platform: Platform, country: &str) -> Result<Option<AppLinkDBResponse>> {
        Ok(self
            .state
            .lock()
            .app_links
            .iter()
            .find(|l| l.platform == platform && l.country == country)
            .cloned())
    }

    async fn list_app_links(&self, platform: Platform) -> Result<Vec<AppLinkDBResponse>> {
        let mut links: Vec<_> = self
            .state
            .lock()
            .app_links
            .iter()
            .filter(|l| l.platform == platform)
            .cloned()
            .collect();
        links.sort_by(|a, b| a.country.cmp(&b.country));
        Ok(links)
    }

    async fn upsert_app_link(&self, request: &AppLinkUpsertDBRequest) -> Result<AppLinkDBResponse> {
        let mut state = self.state.lock();
        let now = Utc::now();
        if let Some(link) = state
            .app_links
            .iter_mut()
            .find(|l| l.platform == request.platform && l.country == request.country)
        {
            link.url = request.url.clone();
            link.updated_at = now;
            return Ok(link.clone());
        }
        let link = AppLinkDBResponse {
            id: Uuid::new_v4(),
            platform: request.platform,
            country: request.country.clone(),
            url: request.url.clone(),
            created_at: now,
            updated_at: now,
        };
        state.app_links.push(link.clone());
        Ok(link)
    }

    async fn delete_app_link(&self, id: AppLinkId) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.app_links.len();
        state.app_links.retain(|l| l.id != id);
        Ok(state.app_links.len() < before)
    }
}
