//! HTTP request handlers for all API endpoints.
//!
//! Each handler validates its input, calls the store or a service and converts the
//! result into an API model. Errors are returned as [`crate::errors::Error`], which
//! renders the JSON error envelope and status code.
//!
//! - [`users`]: anonymous registration, profiles and credits
//! - [`generations`]: generation creation, status, history and cleanup
//! - [`prompts`]: standalone prompt enhancement
//! - [`favorites`]: favourite locations
//! - [`catalog`]: poses, hair styles and custom poses
//! - [`app_links`]: store links by platform and country

pub mod app_links;
pub mod catalog;
pub mod favorites;
pub mod generations;
pub mod prompts;
pub mod users;
