//! API models for the admin console.

use super::pagination::PageQuery;
use super::users::Role;
use crate::errors::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AdminStats {
    pub users: i64,
    pub active_listings: i64,
    /// Keyed by order status; statuses with no orders are reported as 0
    pub orders_by_status: BTreeMap<String, i64>,
    pub open_reports: i64,
    pub flagged_reviews: i64,
    pub pending_reviews: i64,
    /// Requested or accepted care bookings
    pub open_bookings: i64,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AdminUserUpdate {
    pub suspended: Option<bool>,
    /// Replaces the user's roles; `buyer` is always kept
    pub roles: Option<Vec<Role>>,
}

impl AdminUserUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.suspended.is_none() && self.roles.is_none() {
            return Err(Error::BadRequest {
                message: "Nothing to update".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    /// Case-insensitive substring of email or display name
    pub search: Option<String>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageQuery,
}
