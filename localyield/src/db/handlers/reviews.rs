//! Database repository for reviews.

use crate::api::models::reviews::ReviewStatus;
use crate::db::{
    errors::{DbError, Result},
    models::reviews::{ReviewCreateDBRequest, ReviewDBResponse, ReviewEditDBRequest, ReviewStatusCount, ReviewSummary},
};
use crate::types::{OrderId, ReviewId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const REVIEW_SELECT: &str = "SELECT r.id, r.order_id, r.author_id, u.display_name AS author_name, r.producer_id, r.rating, r.body,
        r.status, r.publish_at, r.producer_response, r.responded_at, r.moderation_note, r.created_at, r.updated_at
    FROM reviews r
    LEFT JOIN users u ON u.id = r.author_id";

pub struct Reviews<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Reviews<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// A second review of the same order fails with `reviews_order_unique`.
    #[instrument(skip(self, request), fields(order_id = %abbrev_uuid(&request.order_id), status = %request.status), err)]
    pub async fn create(&mut self, request: &ReviewCreateDBRequest) -> Result<ReviewDBResponse> {
        let id: ReviewId = sqlx::query_scalar(
            r#"
            INSERT INTO reviews (id, order_id, author_id, producer_id, rating, body, status, publish_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.order_id)
        .bind(request.author_id)
        .bind(request.producer_id)
        .bind(request.rating)
        .bind(&request.body)
        .bind(request.status)
        .bind(request.publish_at)
        .fetch_one(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(review_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: ReviewId) -> Result<Option<ReviewDBResponse>> {
        let review = sqlx::query_as::<_, ReviewDBResponse>(&format!("{REVIEW_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(review)
    }

    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&order_id)), err)]
    pub async fn get_by_order(&mut self, order_id: OrderId) -> Result<Option<ReviewDBResponse>> {
        let review = sqlx::query_as::<_, ReviewDBResponse>(&format!("{REVIEW_SELECT} WHERE r.order_id = $1"))
            .bind(order_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(review)
    }

    /// Author edit; only applies while the review is still pending.
    #[instrument(skip(self, request), fields(review_id = %abbrev_uuid(&id)), err)]
    pub async fn edit_pending(&mut self, id: ReviewId, request: &ReviewEditDBRequest) -> Result<ReviewDBResponse> {
        let updated = sqlx::query(
            r#"
            UPDATE reviews SET rating = $2, body = $3, status = $4, publish_at = $5, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(request.rating)
        .bind(&request.body)
        .bind(request.status)
        .bind(request.publish_at)
        .execute(&mut *self.db)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    /// Withdraw a pending review.
    #[instrument(skip(self), fields(review_id = %abbrev_uuid(&id)), err)]
    pub async fn delete_pending(&mut self, id: ReviewId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, response), fields(review_id = %abbrev_uuid(&id)), err)]
    pub async fn set_response(&mut self, id: ReviewId, response: &str) -> Result<ReviewDBResponse> {
        let updated = sqlx::query("UPDATE reviews SET producer_response = $2, responded_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(response)
            .execute(&mut *self.db)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    /// Moderator decision. Clears `publish_at` so the sweeper leaves the review alone.
    #[instrument(skip(self, note), fields(review_id = %abbrev_uuid(&id), status = %status), err)]
    pub async fn moderate(&mut self, id: ReviewId, status: ReviewStatus, note: Option<&str>) -> Result<ReviewDBResponse> {
        let updated = sqlx::query(
            r#"
            UPDATE reviews SET status = $2, moderation_note = COALESCE($3, moderation_note), publish_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(note)
        .execute(&mut *self.db)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    /// Approve every pending review whose resolution window ended by `now`.
    #[instrument(skip(self), err)]
    pub async fn publish_due(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE reviews SET status = 'approved', publish_at = NULL, updated_at = NOW()
             WHERE status = 'pending' AND publish_at <= $1",
        )
        .bind(now)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(producer_id = %abbrev_uuid(&producer_id)), err)]
    pub async fn list_approved_for_producer(&mut self, producer_id: UserId, skip: i64, limit: i64) -> Result<Vec<ReviewDBResponse>> {
        let reviews = sqlx::query_as::<_, ReviewDBResponse>(&format!(
            "{REVIEW_SELECT} WHERE r.producer_id = $1 AND r.status = 'approved' ORDER BY r.created_at DESC, r.id LIMIT $2 OFFSET $3"
        ))
        .bind(producer_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(reviews)
    }

    #[instrument(skip(self), fields(producer_id = %abbrev_uuid(&producer_id)), err)]
    pub async fn summary_for_producer(&mut self, producer_id: UserId) -> Result<ReviewSummary> {
        let summary = sqlx::query_as::<_, ReviewSummary>(
            "SELECT AVG(rating)::float8 AS average_rating, COUNT(*) AS review_count
             FROM reviews WHERE producer_id = $1 AND status = 'approved'",
        )
        .bind(producer_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(summary)
    }

    /// Reviews the user wrote or received, in any status.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_involving(&mut self, user_id: UserId) -> Result<Vec<ReviewDBResponse>> {
        let reviews = sqlx::query_as::<_, ReviewDBResponse>(&format!(
            "{REVIEW_SELECT} WHERE r.author_id = $1 OR r.producer_id = $1 ORDER BY r.created_at DESC, r.id"
        ))
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(reviews)
    }

    #[instrument(skip(self), err)]
    pub async fn list_by_status(&mut self, status: Option<ReviewStatus>, skip: i64, limit: i64) -> Result<Vec<ReviewDBResponse>> {
        let reviews = sqlx::query_as::<_, ReviewDBResponse>(&format!(
            "{REVIEW_SELECT} WHERE ($1::review_status IS NULL OR r.status = $1) ORDER BY r.created_at DESC, r.id LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(reviews)
    }

    #[instrument(skip(self), err)]
    pub async fn count_by_status(&mut self) -> Result<Vec<ReviewStatusCount>> {
        let counts = sqlx::query_as::<_, ReviewStatusCount>("SELECT status, COUNT(*) AS count FROM reviews GROUP BY status ORDER BY status")
            .fetch_all(&mut *self.db)
            .await?;
        Ok(counts)
    }
}
