//! Authentication and authorization.
//!
//! # Authentication methods
//!
//! ## 1. Clerk sessions
//!
//! Production identity comes from Clerk. The browser sends the session JWT in the `__session`
//! cookie, API clients in `Authorization: Bearer <token>`. Tokens are RS256 and verified against
//! the Clerk instance's JWKS (or a configured PEM key). The first request from an unknown
//! subject creates a buyer account for it.
//!
//! ## 2. Dev stub
//!
//! For local work without Clerk, `POST /api/dev/login` sets an HMAC-signed cookie naming a local
//! user. The routes and the cookie check only exist when `auth.dev_stub.enabled` is set.
//!
//! # Authorization
//!
//! - **Roles**: `buyer` (everyone), `producer`, `caregiver`, `admin`
//! - **Ownership**: users manage their own listings, orders, bookings and reviews
//!
//! Suspended accounts are rejected with 403 by the extractors, before any handler runs.
//!
//! # Usage in handlers
//!
//! ```ignore
//! use localyield::api::models::users::CurrentUser;
//!
//! async fn handler(State(state): State<AppState>, current_user: CurrentUser) -> Result<ApiResponse<..>> {
//!     permissions::require_role(&current_user, Role::Producer, Operation::Create, Resource::Products)?;
//!     ...
//! }
//! ```
//!
//! # Modules
//!
//! - [`clerk`]: JWT verification against Clerk signing keys
//! - [`current_user`]: `CurrentUser` / `OptionalUser` extractors
//! - [`dev_stub`]: signed development cookie
//! - [`permissions`]: role and ownership checks
//! - [`utils`]: cookie parsing and display-name generation

pub mod clerk;
pub mod current_user;
pub mod dev_stub;
pub mod permissions;
pub mod utils;
