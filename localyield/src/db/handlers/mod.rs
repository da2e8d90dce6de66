//! Repositories, one per table (or small group of tables).
//!
//! Each repository wraps a `&mut PgConnection`, so it works the same on a pooled connection and
//! inside a transaction:
//!
//! ```ignore
//! use localyield::db::handlers::{Products, Repository};
//!
//! let mut tx = pool.begin().await?;
//! let product = Products::new(&mut tx).get_by_id(id).await?;
//! tx.commit().await?;
//! ```
//!
//! CRUD-shaped tables implement [`Repository`]; the rest expose the operations their handlers need.

pub mod care_bookings;
pub mod cart;
pub mod categories;
pub mod conversations;
pub mod orders;
pub mod products;
pub mod reports;
pub mod repository;
pub mod reviews;
pub mod users;

pub use care_bookings::CareBookings;
pub use cart::Cart;
pub use categories::Categories;
pub use conversations::Conversations;
pub use orders::Orders;
pub use products::Products;
pub use reports::Reports;
pub use repository::Repository;
pub use reviews::Reviews;
pub use users::Users;
