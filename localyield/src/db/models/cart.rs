//! Database models for cart lines.

use crate::types::{ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A cart line joined with the product's current state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartLineDBResponse {
    pub product_id: ProductId,
    pub producer_id: UserId,
    pub title: String,
    pub unit: String,
    pub price: Decimal,
    pub quantity: i32,
    pub stock: i32,
    pub is_archived: bool,
    pub added_at: DateTime<Utc>,
}
