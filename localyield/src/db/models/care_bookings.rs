//! Database models for animal-care bookings.

use crate::api::models::care_bookings::BookingStatus;
use crate::types::{BookingId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct BookingCreateDBRequest {
    pub owner_id: UserId,
    pub caregiver_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub animals: String,
    pub notes: Option<String>,
    pub rate_per_day: Decimal,
    pub total_estimate: Decimal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingDBResponse {
    pub id: BookingId,
    pub owner_id: UserId,
    pub caregiver_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub animals: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub rate_per_day: Decimal,
    pub total_estimate: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
