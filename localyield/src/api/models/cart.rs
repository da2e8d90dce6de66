//! API models for the server-side shopping cart.

use super::validation;
use crate::db::models::cart::CartLineDBResponse;
use crate::errors::Error;
use crate::types::{ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_LINE_QUANTITY: i32 = 99;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CartItemUpdate {
    pub quantity: i32,
}

impl CartItemUpdate {
    pub fn validate(&self) -> Result<i32, Error> {
        validation::range("quantity", self.quantity, 1, MAX_LINE_QUANTITY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    #[schema(value_type = String, format = "uuid")]
    pub product_id: ProductId,
    #[schema(value_type = String, format = "uuid")]
    pub producer_id: UserId,
    pub title: String,
    pub unit: String,
    /// Current listing price; the order snapshots it at checkout
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub line_total: Decimal,
    /// False once the listing is archived or out of stock
    pub available: bool,
    pub stock: i32,
}

impl From<CartLineDBResponse> for CartLine {
    fn from(db: CartLineDBResponse) -> Self {
        let available = !db.is_archived && db.stock > 0;
        Self {
            product_id: db.product_id,
            producer_id: db.producer_id,
            title: db.title,
            unit: db.unit,
            unit_price: db.price,
            quantity: db.quantity,
            line_total: db.price * Decimal::from(db.quantity),
            available,
            stock: db.stock,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    pub lines: Vec<CartLine>,
    /// Sum over available lines only
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    pub item_count: i32,
}

impl CartResponse {
    pub fn new(lines: Vec<CartLine>) -> Self {
        let available = lines.iter().filter(|line| line.available);
        let subtotal = available.clone().map(|line| line.line_total).sum();
        let item_count = available.map(|line| line.quantity).sum();
        Self {
            lines,
            subtotal,
            item_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    fn line(price: &str, quantity: i32, stock: i32, archived: bool) -> CartLineDBResponse {
        CartLineDBResponse {
            product_id: uuid::Uuid::new_v4(),
            producer_id: uuid::Uuid::new_v4(),
            title: "Sourdough".to_string(),
            unit: "loaf".to_string(),
            price: Decimal::from_str(price).unwrap(),
            quantity,
            stock,
            is_archived: archived,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_subtotal_skips_unavailable_lines() {
        let cart = CartResponse::new(vec![
            line("6.50", 2, 10, false).into(),
            line("3.25", 1, 10, true).into(),
            line("4.00", 3, 0, false).into(),
        ]);
        assert_eq!(cart.subtotal, Decimal::from_str("13.00").unwrap());
        assert_eq!(cart.item_count, 2);
        assert_eq!(cart.lines.iter().filter(|l| !l.available).count(), 2);
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(CartItemUpdate { quantity: 0 }.validate().is_err());
        assert!(CartItemUpdate { quantity: 100 }.validate().is_err());
        assert_eq!(CartItemUpdate { quantity: 99 }.validate().unwrap(), 99);
    }
}
