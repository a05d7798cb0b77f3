//! OpenAPI document for the `/api` routes.

use utoipa::OpenApi;

use crate::api;
use crate::db::models::credits::CreditEntryDBResponse;
use crate::errors::ErrorEnvelope;
use crate::generation::{FailureReason, GenerationState, GenerationStatus};

#[derive(OpenApi)]
#[openapi(
    info(title = "Lookbook API", description = "Anonymous users, credit ledger, photo generation and catalog data."),
    servers((url = "/api", description = "Lookbook API")),
    paths(
        api::handlers::users::register_anonymous,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::get_credits,
        api::handlers::users::grant_credits,
        api::handlers::generations::create_generation,
        api::handlers::generations::create_generation_from_urls,
        api::handlers::generations::get_generation,
        api::handlers::generations::list_generation_predictions,
        api::handlers::generations::list_generations,
        api::handlers::generations::list_active_generations,
        api::handlers::generations::delete_old_generations,
        api::handlers::prompts::enhance_prompt,
        api::handlers::favorites::list_favorites,
        api::handlers::favorites::add_favorite,
        api::handlers::favorites::remove_favorite,
        api::handlers::catalog::list_poses,
        api::handlers::catalog::list_hair_styles,
        api::handlers::catalog::list_custom_poses,
        api::handlers::catalog::create_custom_pose,
        api::handlers::catalog::delete_custom_pose,
        api::handlers::app_links::get_app_links,
        api::handlers::app_links::upsert_app_link,
        api::handlers::app_links::delete_app_link,
    ),
    components(
        schemas(
            ErrorEnvelope,
            GenerationStatus,
            GenerationState,
            FailureReason,
            CreditEntryDBResponse,
            api::models::SuccessResponse,
        )
    ),
    tags(
        (name = "users", description = "Anonymous device registration and profiles."),
        (name = "credits", description = "Credit balance and the append-only ledger. Generations are charged once on success and refunded on failure."),
        (name = "generations", description = "Image generation from one or two reference photos. Each generation moves pending, processing, then completed or failed."),
        (name = "prompts", description = "Prompt enhancement through the configured language model."),
        (name = "favorites", description = "Favourite shoot locations."),
        (name = "catalog", description = "Pose and hair style catalogs, and user-defined poses."),
        (name = "app-links", description = "Store links per platform and country."),
    )
)]
pub struct ApiDoc;
