//! Test utilities for integration testing (available with `test-utils` feature).
//!
//! Apps built here run the real router over an [`InMemoryStore`] with every upstream
//! (storage, image model, language model) pointed at a single base URL, typically a mock server.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use url::Url;
use uuid::Uuid;

use crate::config::{Config, EnhancementProvider};
use crate::db::models::users::{UserCreateDBRequest, UserDBResponse};
use crate::store::{InMemoryStore, UserStore};
use crate::{AppState, build_router};

/// Configuration with all upstreams at `upstream`, fast polling and no background tasks
pub fn create_test_config(upstream: &str) -> Config {
    let base = Url::parse(upstream).expect("upstream must be a valid URL");
    let mut config = Config::default();

    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.enable_metrics = false;

    config.supabase.url = base.clone();
    config.supabase.service_key = Some("test-service-key".to_string());

    config.replicate.base_url = base.clone();
    config.replicate.api_token = Some("r8_test".to_string());
    config.replicate.model = "acme/primary".to_string();
    config.replicate.fallback_model = None;
    config.replicate.polling.initial_interval = Duration::from_millis(5);
    config.replicate.polling.max_interval = Duration::from_millis(5);
    config.replicate.polling.timeout = Duration::from_secs(5);

    config.prompt_enhancement.provider = EnhancementProvider::Disabled;
    config.prompt_enhancement.gemini.base_url = base.clone();
    config.prompt_enhancement.openai.base_url = base;

    config.generations.store_results = false;
    config.background_services.stale_sweeper.enabled = false;
    config
}

/// Serve the full router over a fresh in-memory store
pub fn create_test_app(config: Config) -> (TestServer, InMemoryStore) {
    let store = InMemoryStore::new();
    let state = AppState::from_store(config, Arc::new(store.clone())).expect("Failed to build app state");
    let router = build_router(state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, store)
}

/// Register a user with a random device id and the given starting balance
pub async fn create_test_user(store: &InMemoryStore, credits: i64) -> UserDBResponse {
    store
        .create_user(&UserCreateDBRequest {
            device_id: format!("test-device-{}", Uuid::new_v4()),
            initial_credits: credits,
        })
        .await
        .expect("Failed to create test user")
}
