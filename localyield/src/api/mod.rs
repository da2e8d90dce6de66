//! HTTP API: route handlers, request/response models and the response envelope.
//!
//! Everything here is mounted under `/api`:
//!
//! - **Discovery** (`/listings`, `/caregivers`, `/categories`): public search by text, category
//!   and distance from a ZIP code
//! - **Selling** (`/products`, `/me/products`): producer listings
//! - **Buying** (`/cart`, `/orders`): server-side cart and per-producer checkout
//! - **Reviews** (`/reviews`, `/producers/{id}/reviews`): ratings with a resolution window for
//!   negative reviews
//! - **Animal care** (`/me/caregiver-profile`, `/care-bookings`)
//! - **Messaging** (`/conversations`)
//! - **Moderation** (`/reports`, `/admin/*`)
//!
//! Successful responses are wrapped as `{ "ok": true, "data": ... }` by [`envelope::ApiResponse`];
//! errors render as `{ "ok": false, "error": ..., "code": ... }`. The OpenAPI document is served at
//! `/api-docs/openapi.json` and rendered at `/docs`.

pub mod envelope;
pub mod extract;
pub mod handlers;
pub mod models;
