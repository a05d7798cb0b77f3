//! # lookbook: backend for an AI fashion and jewelry photo app
//!
//! `lookbook` serves anonymous, device-bound users who spend credits to turn one or two
//! reference photos into a generated image. It exposes a JSON API under `/api` for device
//! registration, the credit ledger, generations, prompt enhancement, favourite locations,
//! pose and hair style catalogs, and per-country store links.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Handlers in [`api`] talk to an
//! `Arc<dyn Store>` ([`store`]), which is PostgreSQL in production and an in-memory store in tests.
//!
//! ### Generation flow
//!
//! A generation request is validated, its reference photos are normalised ([`images`]) and
//! uploaded to object storage, and a `pending` row is written. The prompt is then enhanced by a
//! language model ([`prompts`]), a prediction is created on the image model and polled to a
//! terminal state ([`clients`]), and the result is rehosted in storage. The generation
//! lifecycle ([`generation`]) moves each row `pending -> processing -> completed | failed`
//! with compare-and-swap updates, and settles credits exactly once: a charge on completion and
//! a refund on failure, both keyed by generation in the ledger.
//!
//! Generations left running past `generations.stale_after` are failed and refunded, either
//! lazily when read or by the stale sweeper in [`BackgroundServices`].
//!
//! ## Configuration
//!
//! See [`config`]: a YAML file with `LOOKBOOK_` environment overrides plus well-known service
//! variables such as `DATABASE_URL` and `REPLICATE_API_TOKEN`.

pub mod api;
pub mod aspect_ratio;
pub mod clients;
pub mod config;
pub mod db;
pub mod errors;
pub mod generation;
pub mod images;
mod metrics;
mod openapi;
pub mod prompts;
pub mod store;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{delete, get, post},
};
use bon::Builder;
pub use config::Config;
use config::CorsOrigin;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers,
    generation::GenerationService,
    openapi::ApiDoc,
    prompts::PromptEnhancer,
    store::{PostgresStore, Store},
};

pub use types::{GenerationId, UserId};

/// Multipart overhead allowed on top of the raw image bytes
const MULTIPART_MARGIN_BYTES: usize = 1024 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .store(store)
///     .config(config)
///     .generations(generations)
///     .enhancer(enhancer)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub generations: Arc<GenerationService>,
    pub enhancer: Arc<PromptEnhancer>,
}

impl AppState {
    /// Wire the prompt enhancer and generation service over `store`
    pub fn from_store(config: Config, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let enhancer = Arc::new(PromptEnhancer::from_config(&config.prompt_enhancement)?);
        let generations = Arc::new(GenerationService::new(&config, store.clone(), enhancer.clone())?);
        Ok(Self::builder()
            .store(store)
            .config(config)
            .generations(generations)
            .enhancer(enhancer)
            .build())
    }
}

/// Get the lookbook database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to PostgreSQL with the configured pool settings and run migrations
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let optional = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(optional(settings.idle_timeout_secs))
        .max_lifetime(optional(settings.max_lifetime_secs))
        .connect(&config.database.url)
        .await?;

    migrator().run(&pool).await?;
    info!("Database migrations applied");
    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allow_origin = if config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(config.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

async fn metrics_handler() -> errors::Result<String> {
    Ok(metrics::render()?)
}

/// Build the application router.
///
/// - `/api/*`: the JSON API
/// - `/healthz`: liveness
/// - `/internal/metrics`: Prometheus text format, when `enable_metrics` is set
/// - `/openapi.json` and `/docs`: the API document and its Scalar viewer
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let generations = &state.config.generations;
    let upload_limit = generations.max_upload_bytes * generations.max_reference_images + MULTIPART_MARGIN_BYTES;

    let api_routes = Router::new()
        // Users and credits
        .route("/users/anonymous", post(handlers::users::register_anonymous))
        .route(
            "/users/{user_id}",
            get(handlers::users::get_user).patch(handlers::users::update_user),
        )
        .route(
            "/users/{user_id}/credits",
            get(handlers::users::get_credits).post(handlers::users::grant_credits),
        )
        // Generations
        .route(
            "/generations",
            post(handlers::generations::create_generation).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/generations/from-urls", post(handlers::generations::create_generation_from_urls))
        .route("/generations/{generation_id}", get(handlers::generations::get_generation))
        .route(
            "/generations/{generation_id}/predictions",
            get(handlers::generations::list_generation_predictions),
        )
        .route(
            "/users/{user_id}/generations",
            get(handlers::generations::list_generations).delete(handlers::generations::delete_old_generations),
        )
        .route(
            "/users/{user_id}/generations/active",
            get(handlers::generations::list_active_generations),
        )
        .route("/prompts/enhance", post(handlers::prompts::enhance_prompt))
        // Favourites
        .route(
            "/favorites/{user_id}",
            get(handlers::favorites::list_favorites).post(handlers::favorites::add_favorite),
        )
        .route("/favorites/{user_id}/{location_id}", delete(handlers::favorites::remove_favorite))
        // Catalog
        .route("/poses", get(handlers::catalog::list_poses))
        .route("/hair-styles", get(handlers::catalog::list_hair_styles))
        .route(
            "/users/{user_id}/poses",
            get(handlers::catalog::list_custom_poses).post(handlers::catalog::create_custom_pose),
        )
        .route("/users/{user_id}/poses/{pose_id}", delete(handlers::catalog::delete_custom_pose))
        // Store links
        .route(
            "/app-links",
            get(handlers::app_links::get_app_links).put(handlers::app_links::upsert_app_link),
        )
        .route("/app-links/{id}", delete(handlers::app_links::delete_app_link))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if state.config.enable_metrics {
        router = router.route("/internal/metrics", get(metrics_handler));
    }

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks that run alongside the HTTP server.
///
/// Tasks watch a shared cancellation token; [`shutdown`](BackgroundServices::shutdown)
/// cancels it and waits for every task to finish.
pub struct BackgroundServices {
    tasks: JoinSet<anyhow::Result<()>>,
    shutdown_token: CancellationToken,
}

impl BackgroundServices {
    /// Start the background tasks enabled in `config`
    pub fn start(config: &Config, store: Arc<dyn Store>) -> Self {
        let shutdown_token = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let sweeper = &config.background_services.stale_sweeper;
        if sweeper.enabled {
            tasks.spawn(generation::sweeper::run_stale_sweeper(
                store,
                config.credits.generation_cost,
                config.generations.stale_after,
                sweeper.interval,
                shutdown_token.clone(),
            ));
        } else {
            info!("Stale generation sweeper disabled; stale generations expire when read");
        }

        Self { tasks, shutdown_token }
    }

    /// Number of running tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Gracefully shutdown all background tasks
    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();

        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Background task failed"),
                Err(e) => tracing::error!(error = %e, "Background task panicked"),
            }
        }
    }
}

/// Top-level container that owns the router, the database pool and background services.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations and starts
///    background services
/// 2. **Serve**: [`Application::serve`] binds the listener and handles requests until the
///    shutdown future resolves, then stops background tasks and closes the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting lookbook with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let store: Arc<dyn Store> = Arc::new(PostgresStore::new(pool.clone()));

        let state = AppState::from_store(config.clone(), store.clone())?;
        let router = build_router(state)?;
        let bg_services = BackgroundServices::start(&config, store);

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Lookbook listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
