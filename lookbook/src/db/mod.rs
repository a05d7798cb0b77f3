//! Database layer for data persistence and access.
//!
//! SQLx over the Postgres instance that backs Supabase.
//!
//! ```text
//! ┌─────────────┐
//! │    Store    │  (crate::store - per-domain traits used by services)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries and transactions)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! Migrations live in `migrations/` and are embedded through [`crate::migrator`]:
//!
//! ```ignore
//! lookbook::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
