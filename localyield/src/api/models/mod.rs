//! API request and response models.
//!
//! Request types carry a `validate` method that trims and checks fields and returns a
//! [`crate::errors::Error::Validation`] naming the first bad field. Response types convert from the
//! database records in [`crate::db::models`], dropping anything the caller shouldn't see.

pub mod admin;
pub mod auth;
pub mod care_bookings;
pub mod cart;
pub mod categories;
pub mod conversations;
pub mod orders;
pub mod pagination;
pub mod products;
pub mod reports;
pub mod reviews;
pub mod users;
pub mod validation;
