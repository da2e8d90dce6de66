//! Database models for reviews.

use crate::api::models::reviews::ReviewStatus;
use crate::types::{OrderId, ReviewId, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ReviewCreateDBRequest {
    pub order_id: OrderId,
    pub author_id: UserId,
    pub producer_id: UserId,
    pub rating: i16,
    pub body: String,
    pub status: ReviewStatus,
    pub publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ReviewEditDBRequest {
    pub rating: i16,
    pub body: String,
    pub status: ReviewStatus,
    pub publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewDBResponse {
    pub id: ReviewId,
    pub order_id: OrderId,
    pub author_id: UserId,
    pub author_name: Option<String>,
    pub producer_id: UserId,
    pub rating: i16,
    pub body: String,
    pub status: ReviewStatus,
    pub publish_at: Option<DateTime<Utc>>,
    pub producer_response: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub moderation_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, sqlx::FromRow)]
pub struct ReviewSummary {
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct ReviewStatusCount {
    pub status: ReviewStatus,
    pub count: i64,
}
