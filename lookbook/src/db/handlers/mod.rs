//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open
//! transaction) and returns models from [`crate::db::models`]. Operations spanning several
//! statements open a nested transaction on that connection, so callers may compose them
//! inside their own transaction.
//!
//! - [`Users`]: device registration and profile updates
//! - [`Credits`]: append-only ledger (grants, generation charges and refunds)
//! - [`Generations`]: generation rows, compare-and-swap transitions, prediction attempts
//! - [`Favorites`], [`Catalog`], [`AppLinks`]: reference data
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let user = Users::new(&mut tx).create(&request).await?;
//! tx.commit().await?;
//! ```

pub mod app_links;
pub mod catalog;
pub mod credits;
pub mod favorites;
pub mod generations;
pub mod users;

pub use app_links::AppLinks;
pub use catalog::Catalog;
pub use credits::Credits;
pub use favorites::Favorites;
pub use generations::Generations;
pub use users::Users;
