//! Axum route handlers, one module per resource.
//!
//! Handlers validate input through the request models, check authorization with
//! [`crate::auth::permissions`], and talk to PostgreSQL through the repositories in
//! [`crate::db::handlers`]. Anything that must be all-or-nothing (checkout, status changes,
//! report resolution) runs in a single transaction.

pub mod admin;
pub mod care_bookings;
pub mod cart;
pub mod categories;
pub mod conversations;
pub mod dev_auth;
pub mod listings;
pub mod orders;
pub mod products;
pub mod reports;
pub mod reviews;
pub mod users;
