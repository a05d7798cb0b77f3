//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases for readability:
//!
//! - [`UserId`]: app user (anonymous, keyed by device)
//! - [`GenerationId`]: one generation request, the logical key of a `reference_results` row
//! - [`PoseId`], [`AppLinkId`], [`FavoriteId`]: catalog and preference records

use uuid::Uuid;

pub type UserId = Uuid;
pub type GenerationId = Uuid;
pub type PoseId = Uuid;
pub type FavoriteId = Uuid;
pub type AppLinkId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
