//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! All routes below are mounted under `/api`:
//!
//! - **Users** (`/users/*`): anonymous registration, profile, credits, history
//! - **Generations** (`/generations/*`): create and poll generations
//! - **Prompts** (`/prompts/enhance`)
//! - **Favorites** (`/favorites/*`)
//! - **Catalog** (`/poses`, `/hair-styles`, `/users/{user_id}/poses`)
//! - **App links** (`/app-links`)
//!
//! The OpenAPI document is served at `/openapi.json` with an interactive viewer at `/docs`.

pub mod handlers;
pub mod models;
