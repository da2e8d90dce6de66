//! Database models for products.

use crate::api::models::products::ProductUpdate;
use crate::types::{ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct ProductCreateDBRequest {
    pub producer_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub unit: String,
    pub stock: i32,
    pub zip: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub unit: Option<String>,
    pub stock: Option<i32>,
    pub zip: Option<String>,
    pub image_url: Option<Option<String>>,
    pub is_archived: Option<bool>,
}

impl From<ProductUpdate> for ProductUpdateDBRequest {
    fn from(update: ProductUpdate) -> Self {
        Self {
            title: update.title,
            description: update.description,
            category: update.category,
            price: update.price,
            unit: update.unit,
            stock: update.stock,
            zip: update.zip,
            image_url: update.image_url,
            is_archived: None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductDBResponse {
    pub id: ProductId,
    pub producer_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub unit: String,
    pub stock: i32,
    pub zip: String,
    pub image_url: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A searchable product joined with its producer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingDBResponse {
    #[sqlx(flatten)]
    pub product: ProductDBResponse,
    pub producer_name: Option<String>,
}
