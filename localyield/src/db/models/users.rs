//! Database models for users and caregiver profiles.

use crate::api::models::users::{Role, ValidProfileUpdate};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub external_id: Option<String>,
    pub email: String,
    pub display_name: Option<String>,
    pub auth_source: String,
    /// `Buyer` is always added
    pub roles: Vec<Role>,
}

/// Database request for updating a user. `Some(None)` clears the column.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub display_name: Option<Option<String>>,
    pub zip: Option<Option<String>>,
    pub bio: Option<Option<String>>,
}

impl From<&ValidProfileUpdate> for UserUpdateDBRequest {
    fn from(update: &ValidProfileUpdate) -> Self {
        Self {
            display_name: update.display_name.clone(),
            zip: update.zip.clone(),
            bio: update.bio.clone(),
        }
    }
}

/// Database response for a user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub external_id: Option<String>,
    pub email: String,
    pub display_name: Option<String>,
    pub zip: Option<String>,
    pub bio: Option<String>,
    pub auth_source: String,
    pub is_suspended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CaregiverProfileDBResponse {
    pub user_id: UserId,
    pub bio: String,
    pub services: Vec<String>,
    pub rate_per_day: Decimal,
    pub zip: String,
    pub updated_at: DateTime<Utc>,
}

/// A caregiver as shown in search results.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CaregiverListingDBResponse {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub bio: String,
    pub services: Vec<String>,
    pub rate_per_day: Decimal,
    pub zip: String,
    pub created_at: DateTime<Utc>,
}
