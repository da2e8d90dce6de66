//! PostgreSQL persistence.
//!
//! ```text
//! api::handlers  ->  db::handlers (repositories)  ->  db::models (rows)  ->  PostgreSQL
//! ```
//!
//! - [`handlers`]: repositories wrapping a connection or transaction
//! - [`models`]: row structs and insert/update requests
//! - [`errors`]: [`errors::DbError`], classified from `sqlx::Error`
//!
//! Migrations live in `migrations/` and are applied at startup through [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
