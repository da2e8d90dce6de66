//! Database records and insert/update requests.
//!
//! Row types derive `sqlx::FromRow`; API models convert from them with `From`.

pub mod care_bookings;
pub mod cart;
pub mod categories;
pub mod conversations;
pub mod orders;
pub mod products;
pub mod reports;
pub mod reviews;
pub mod users;
