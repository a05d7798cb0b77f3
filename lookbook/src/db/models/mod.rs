//! Database record structures matching the table schemas.
//!
//! Naming follows `<Entity>CreateDBRequest` / `<Entity>UpdateDBRequest` for writes and
//! `<Entity>DBResponse` for rows read back.

pub mod app_links;
pub mod catalog;
pub mod credits;
pub mod favorites;
pub mod generations;
pub mod users;
