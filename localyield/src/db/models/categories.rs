//! Database models for custom categories.

use crate::api::models::categories::CategoryStatus;
use crate::types::{CategoryId, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CategoryCreateDBRequest {
    pub slug: String,
    pub name: String,
    pub proposed_by: UserId,
}

#[derive(Debug, Clone)]
pub struct CategoryDecisionDBRequest {
    pub status: CategoryStatus,
    pub decided_by: UserId,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomCategoryDBResponse {
    pub id: CategoryId,
    pub slug: String,
    pub name: String,
    pub status: CategoryStatus,
    pub proposed_by: UserId,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
