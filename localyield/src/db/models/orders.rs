//! Database models for orders and their line snapshots.

use crate::api::models::orders::OrderStatus;
use crate::types::{OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderDBResponse {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub producer_id: UserId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemDBResponse {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub title: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct OrderStatusCount {
    pub status: OrderStatus,
    pub count: i64,
}
