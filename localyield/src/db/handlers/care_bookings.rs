//! Database repository for animal-care bookings.

use crate::api::models::care_bookings::BookingStatus;
use crate::db::{
    errors::{DbError, Result},
    models::care_bookings::{BookingCreateDBRequest, BookingDBResponse},
};
use crate::types::{BookingId, UserId, abbrev_uuid};
use chrono::NaiveDate;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, owner_id, caregiver_id, start_date, end_date, animals, notes, status, rate_per_day, total_estimate, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct BookingFilter {
    pub owner_id: Option<UserId>,
    pub caregiver_id: Option<UserId>,
    pub status: Option<BookingStatus>,
    pub skip: i64,
    pub limit: i64,
}

pub struct CareBookings<'c> {
    db: &'c mut PgConnection,
}

impl<'c> CareBookings<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(caregiver_id = %abbrev_uuid(&request.caregiver_id)), err)]
    pub async fn create(&mut self, request: &BookingCreateDBRequest) -> Result<BookingDBResponse> {
        let booking = sqlx::query_as::<_, BookingDBResponse>(&format!(
            r#"
            INSERT INTO care_bookings (id, owner_id, caregiver_id, start_date, end_date, animals, notes, rate_per_day, total_estimate)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(request.caregiver_id)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(&request.animals)
        .bind(&request.notes)
        .bind(request.rate_per_day)
        .bind(request.total_estimate)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(booking)
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: BookingId) -> Result<Option<BookingDBResponse>> {
        let booking = sqlx::query_as::<_, BookingDBResponse>(&format!("SELECT {BOOKING_COLUMNS} FROM care_bookings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(booking)
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: BookingId) -> Result<Option<BookingDBResponse>> {
        let booking = sqlx::query_as::<_, BookingDBResponse>(&format!("SELECT {BOOKING_COLUMNS} FROM care_bookings WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(booking)
    }

    /// Serialize acceptances for one caregiver so two overlapping requests can't both be accepted.
    #[instrument(skip(self), fields(caregiver_id = %abbrev_uuid(&caregiver_id)), err)]
    pub async fn lock_caregiver(&mut self, caregiver_id: UserId) -> Result<()> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(caregiver_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Whether the caregiver already has an accepted booking sharing a day with `start..=end`.
    #[instrument(skip(self), fields(caregiver_id = %abbrev_uuid(&caregiver_id)), err)]
    pub async fn has_accepted_overlap(&mut self, caregiver_id: UserId, start: NaiveDate, end: NaiveDate, exclude: BookingId) -> Result<bool> {
        let overlaps: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM care_bookings
                WHERE caregiver_id = $1 AND status = 'accepted' AND id <> $4
                  AND start_date <= $3 AND end_date >= $2
            )
            "#,
        )
        .bind(caregiver_id)
        .bind(start)
        .bind(end)
        .bind(exclude)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(overlaps)
    }

    #[instrument(skip(self), fields(booking_id = %abbrev_uuid(&id), status = %status), err)]
    pub async fn set_status(&mut self, id: BookingId, status: BookingStatus) -> Result<BookingDBResponse> {
        sqlx::query_as::<_, BookingDBResponse>(&format!(
            "UPDATE care_bookings SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &BookingFilter) -> Result<Vec<BookingDBResponse>> {
        let bookings = sqlx::query_as::<_, BookingDBResponse>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM care_bookings
             WHERE ($1::uuid IS NULL OR owner_id = $1)
               AND ($2::uuid IS NULL OR caregiver_id = $2)
               AND ($3::booking_status IS NULL OR status = $3)
             ORDER BY start_date DESC, created_at DESC, id
             LIMIT $4 OFFSET $5"
        ))
        .bind(filter.owner_id)
        .bind(filter.caregiver_id)
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(bookings)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &BookingFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM care_bookings
             WHERE ($1::uuid IS NULL OR owner_id = $1)
               AND ($2::uuid IS NULL OR caregiver_id = $2)
               AND ($3::booking_status IS NULL OR status = $3)",
        )
        .bind(filter.owner_id)
        .bind(filter.caregiver_id)
        .bind(filter.status)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Requested or accepted bookings.
    #[instrument(skip(self), err)]
    pub async fn count_open(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM care_bookings WHERE status IN ('requested', 'accepted')")
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}
