//! API models for animal-care bookings.
//!
//! ```text
//! requested ──► accepted ──► completed
//!     │  │          │
//!     │  └──► declined
//!     └─────────────┴──► canceled
//! ```

use super::pagination::PageQuery;
use super::validation;
use crate::db::models::care_bookings::BookingDBResponse;
use crate::errors::Error;
use crate::types::{BookingId, Operation, Resource, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::{IntoParams, ToSchema};

pub const MAX_BOOKING_DAYS: i64 = 60;
pub const MAX_ANIMALS_LEN: usize = 500;
pub const MAX_NOTES_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Requested,
    Accepted,
    Declined,
    Canceled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Declined => "declined",
            BookingStatus::Canceled => "canceled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Requested, Accepted) | (Requested, Declined) | (Requested, Canceled) | (Accepted, Canceled) | (Accepted, Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingActor {
    Owner,
    Caregiver,
    Admin,
}

impl BookingActor {
    pub fn for_booking(booking: &BookingDBResponse, user_id: UserId, is_admin: bool) -> Option<Self> {
        if booking.caregiver_id == user_id {
            Some(BookingActor::Caregiver)
        } else if booking.owner_id == user_id {
            Some(BookingActor::Owner)
        } else if is_admin {
            Some(BookingActor::Admin)
        } else {
            None
        }
    }
}

/// Check a status change against the machine, the caller's part and the calendar.
pub fn authorize_transition(booking: &BookingDBResponse, to: BookingStatus, actor: BookingActor, today: NaiveDate) -> Result<(), Error> {
    let from = booking.status;
    if !from.can_transition_to(to) {
        return Err(Error::InvalidTransition {
            entity: "booking".to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let permitted = match (actor, to) {
        (BookingActor::Admin, _) => true,
        (_, BookingStatus::Canceled) => true,
        (BookingActor::Caregiver, BookingStatus::Accepted | BookingStatus::Declined | BookingStatus::Completed) => true,
        _ => false,
    };
    if !permitted {
        return Err(Error::InsufficientPermissions {
            action: Operation::Update,
            resource: Resource::CareBookings,
        });
    }

    if to == BookingStatus::Completed && booking.end_date > today {
        return Err(Error::BadRequest {
            message: format!("Booking can't be completed before its end date ({})", booking.end_date),
        });
    }
    Ok(())
}

/// Inclusive day count of a date range.
pub fn booking_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

pub fn total_estimate(rate_per_day: Decimal, days: i64) -> Decimal {
    (rate_per_day * Decimal::from(days)).round_dp(2)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BookingCreate {
    #[schema(value_type = String, format = "uuid")]
    pub caregiver_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// What needs looking after, e.g. "6 hens, 2 goats"
    pub animals: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidBookingCreate {
    pub caregiver_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i64,
    pub animals: String,
    pub notes: Option<String>,
}

impl BookingCreate {
    pub fn validate(&self, owner_id: UserId, today: NaiveDate) -> Result<ValidBookingCreate, Error> {
        if self.caregiver_id == owner_id {
            return Err(Error::BadRequest {
                message: "You cannot book yourself".to_string(),
            });
        }
        if self.start_date < today {
            return Err(validation::invalid("start_date", "must not be in the past"));
        }
        if self.end_date < self.start_date {
            return Err(validation::invalid("end_date", "must not be before start_date"));
        }
        let days = booking_days(self.start_date, self.end_date);
        if days > MAX_BOOKING_DAYS {
            return Err(validation::invalid("end_date", format!("bookings are limited to {MAX_BOOKING_DAYS} days")));
        }

        Ok(ValidBookingCreate {
            caregiver_id: self.caregiver_id,
            start_date: self.start_date,
            end_date: self.end_date,
            days,
            animals: validation::text("animals", &self.animals, 1, MAX_ANIMALS_LEN)?,
            notes: validation::optional_text("notes", self.notes.as_deref(), MAX_NOTES_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BookingStatusUpdate {
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingView {
    #[default]
    Owner,
    Caregiver,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListBookingsQuery {
    /// Bookings the caller requested (`owner`, default) or received (`caregiver`)
    #[serde(rename = "as")]
    #[param(rename = "as")]
    pub view: Option<BookingView>,
    pub status: Option<BookingStatus>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BookingId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub caregiver_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i64,
    pub animals: String,
    pub notes: Option<String>,
    pub status: BookingStatus,
    #[schema(value_type = String)]
    pub rate_per_day: Decimal,
    #[schema(value_type = String)]
    pub total_estimate: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BookingDBResponse> for BookingResponse {
    fn from(db: BookingDBResponse) -> Self {
        Self {
            id: db.id,
            owner_id: db.owner_id,
            caregiver_id: db.caregiver_id,
            days: booking_days(db.start_date, db.end_date),
            start_date: db.start_date,
            end_date: db.end_date,
            animals: db.animals,
            notes: db.notes,
            status: db.status,
            rate_per_day: db.rate_per_day,
            total_estimate: db.total_estimate,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn booking(status: BookingStatus, end: &str) -> BookingDBResponse {
        BookingDBResponse {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            caregiver_id: Uuid::new_v4(),
            start_date: date("2026-06-01"),
            end_date: date(end),
            animals: "3 goats".to_string(),
            notes: None,
            status,
            rate_per_day: Decimal::from(30),
            total_estimate: Decimal::from(90),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request(start: &str, end: &str) -> BookingCreate {
        BookingCreate {
            caregiver_id: Uuid::new_v4(),
            start_date: date(start),
            end_date: date(end),
            animals: " 12 hens ".to_string(),
            notes: None,
        }
    }

    #[test]
    fn test_create_validation() {
        let owner = Uuid::new_v4();
        let today = date("2026-05-10");

        let valid = request("2026-05-10", "2026-05-12").validate(owner, today).unwrap();
        assert_eq!(valid.days, 3);
        assert_eq!(valid.animals, "12 hens");

        assert!(request("2026-05-09", "2026-05-12").validate(owner, today).is_err());
        assert!(request("2026-05-12", "2026-05-11").validate(owner, today).is_err());
        assert!(request("2026-05-10", "2026-07-08").validate(owner, today).is_ok());
        assert!(request("2026-05-10", "2026-07-09").validate(owner, today).is_err());

        let mut own = request("2026-05-10", "2026-05-12");
        own.caregiver_id = owner;
        assert!(matches!(own.validate(owner, today), Err(Error::BadRequest { .. })));
    }

    #[test]
    fn test_total_estimate() {
        let rate = Decimal::from_str("27.50").unwrap();
        assert_eq!(total_estimate(rate, booking_days(date("2026-05-10"), date("2026-05-13"))), Decimal::from(110));
    }

    #[test]
    fn test_transition_permissions() {
        let today = date("2026-06-10");
        let requested = booking(BookingStatus::Requested, "2026-06-03");
        assert!(authorize_transition(&requested, BookingStatus::Accepted, BookingActor::Caregiver, today).is_ok());
        assert!(matches!(
            authorize_transition(&requested, BookingStatus::Accepted, BookingActor::Owner, today),
            Err(Error::InsufficientPermissions { .. })
        ));
        assert!(authorize_transition(&requested, BookingStatus::Canceled, BookingActor::Owner, today).is_ok());
        assert!(matches!(
            authorize_transition(&requested, BookingStatus::Completed, BookingActor::Caregiver, today),
            Err(Error::InvalidTransition { .. })
        ));

        let accepted = booking(BookingStatus::Accepted, "2026-06-03");
        assert!(authorize_transition(&accepted, BookingStatus::Canceled, BookingActor::Caregiver, today).is_ok());
        assert!(authorize_transition(&accepted, BookingStatus::Completed, BookingActor::Caregiver, today).is_ok());
        assert!(authorize_transition(&accepted, BookingStatus::Declined, BookingActor::Caregiver, today).is_err());
    }

    #[test]
    fn test_completion_waits_for_end_date() {
        let accepted = booking(BookingStatus::Accepted, "2026-06-20");
        let err = authorize_transition(&accepted, BookingStatus::Completed, BookingActor::Caregiver, date("2026-06-19")).unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
        assert!(authorize_transition(&accepted, BookingStatus::Completed, BookingActor::Caregiver, date("2026-06-20")).is_ok());
    }
}
