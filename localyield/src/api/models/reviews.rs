//! API models for reviews and their moderation.
//!
//! A review at or below the negative threshold isn't published straight away. It sits `pending`
//! for the resolution window so buyer and producer can sort things out, and the author may still
//! edit or withdraw it. When the window lapses it is published as written.

use super::pagination::PageQuery;
use super::validation;
use crate::db::models::reviews::{ReviewDBResponse, ReviewSummary};
use crate::errors::Error;
use crate::types::{OrderId, ReviewId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use utoipa::{IntoParams, ToSchema};

pub const MAX_BODY_LEN: usize = 2000;
pub const MAX_RESPONSE_LEN: usize = 2000;
pub const MAX_NOTE_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "review_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Flagged,
    Hidden,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Flagged => "flagged",
            ReviewStatus::Hidden => "hidden",
        }
    }

    /// Moves a moderator may make.
    pub fn can_moderate_to(&self, next: ReviewStatus) -> bool {
        use ReviewStatus::*;
        matches!(
            (self, next),
            (Pending, Approved | Flagged | Hidden) | (Approved, Flagged | Hidden) | (Flagged, Approved | Hidden) | (Hidden, Approved)
        )
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and publish time for a review with `rating` written at `now`.
pub fn initial_publication(rating: i16, threshold: i16, window: Duration, now: DateTime<Utc>) -> (ReviewStatus, Option<DateTime<Utc>>) {
    if rating > threshold {
        return (ReviewStatus::Approved, None);
    }
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::days(30));
    (ReviewStatus::Pending, Some(now + window))
}

fn rating(value: i16) -> Result<i16, Error> {
    validation::range("rating", value, 1, 5)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReviewCreate {
    #[schema(value_type = String, format = "uuid")]
    pub order_id: OrderId,
    pub rating: i16,
    pub body: Option<String>,
}

impl ReviewCreate {
    /// Returns the rating and the trimmed body.
    pub fn validate(&self) -> Result<(i16, String), Error> {
        let rating = rating(self.rating)?;
        let body = validation::optional_text("body", self.body.as_deref(), MAX_BODY_LEN)?.unwrap_or_default();
        Ok((rating, body))
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReviewEdit {
    pub rating: Option<i16>,
    pub body: Option<String>,
}

impl ReviewEdit {
    pub fn validate(&self) -> Result<(Option<i16>, Option<String>), Error> {
        if self.rating.is_none() && self.body.is_none() {
            return Err(Error::BadRequest {
                message: "Nothing to update".to_string(),
            });
        }
        let rating = self.rating.map(rating).transpose()?;
        let body = match self.body.as_deref() {
            Some(body) => Some(validation::optional_text("body", Some(body), MAX_BODY_LEN)?.unwrap_or_default()),
            None => None,
        };
        Ok((rating, body))
    }
}

/// Where an edited pending review lands: raising the rating above the threshold publishes it now,
/// otherwise it keeps its original publish time.
pub fn status_after_edit(review: &ReviewDBResponse, new_rating: i16, threshold: i16) -> (ReviewStatus, Option<DateTime<Utc>>) {
    if new_rating > threshold {
        (ReviewStatus::Approved, None)
    } else {
        (ReviewStatus::Pending, review.publish_at)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProducerResponseRequest {
    pub response: String,
}

impl ProducerResponseRequest {
    pub fn validate(&self) -> Result<String, Error> {
        validation::text("response", &self.response, 1, MAX_RESPONSE_LEN)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ModerationRequest {
    pub status: ReviewStatus,
    pub note: Option<String>,
}

impl ModerationRequest {
    pub fn validate(&self, current: ReviewStatus) -> Result<Option<String>, Error> {
        if !current.can_moderate_to(self.status) {
            return Err(Error::InvalidTransition {
                entity: "review".to_string(),
                from: current.to_string(),
                to: self.status.to_string(),
            });
        }
        validation::optional_text("note", self.note.as_deref(), MAX_NOTE_LEN)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListReviewsQuery {
    pub status: Option<ReviewStatus>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ReviewId,
    #[schema(value_type = String, format = "uuid")]
    pub order_id: OrderId,
    #[schema(value_type = String, format = "uuid")]
    pub author_id: UserId,
    pub author_name: Option<String>,
    #[schema(value_type = String, format = "uuid")]
    pub producer_id: UserId,
    pub rating: i16,
    pub body: String,
    pub status: ReviewStatus,
    /// When a pending review goes public on its own
    pub publish_at: Option<DateTime<Utc>>,
    pub producer_response: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewResponse {
    /// Strip fields only moderators should see.
    pub fn public(mut self) -> Self {
        self.moderation_note = None;
        self
    }
}

impl From<ReviewDBResponse> for ReviewResponse {
    fn from(db: ReviewDBResponse) -> Self {
        Self {
            id: db.id,
            order_id: db.order_id,
            author_id: db.author_id,
            author_name: db.author_name,
            producer_id: db.producer_id,
            rating: db.rating,
            body: db.body,
            status: db.status,
            publish_at: db.publish_at,
            producer_response: db.producer_response,
            responded_at: db.responded_at,
            moderation_note: db.moderation_note,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProducerReviewsResponse {
    /// Mean of approved ratings, rounded to two places; `null` with no reviews
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub items: Vec<ReviewResponse>,
    pub page: i64,
    pub page_size: i64,
}

impl ProducerReviewsResponse {
    pub fn new(summary: ReviewSummary, items: Vec<ReviewDBResponse>, query: &PageQuery) -> Self {
        Self {
            average_rating: summary.average_rating.map(|avg| (avg * 100.0).round() / 100.0),
            review_count: summary.review_count,
            items: items.into_iter().map(|r| ReviewResponse::from(r).public()).collect(),
            page: query.page(),
            page_size: query.page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_publication() {
        let now = Utc::now();
        let window = Duration::from_secs(72 * 3600);
        assert_eq!(initial_publication(5, 2, window, now), (ReviewStatus::Approved, None));
        assert_eq!(initial_publication(3, 2, window, now), (ReviewStatus::Approved, None));

        let (status, publish_at) = initial_publication(2, 2, window, now);
        assert_eq!(status, ReviewStatus::Pending);
        assert_eq!(publish_at, Some(now + chrono::Duration::hours(72)));
        assert_eq!(initial_publication(1, 2, window, now).0, ReviewStatus::Pending);
    }

    #[test]
    fn test_moderation_transitions() {
        use ReviewStatus::*;
        assert!(Pending.can_moderate_to(Approved));
        assert!(Approved.can_moderate_to(Hidden));
        assert!(Flagged.can_moderate_to(Approved));
        assert!(Hidden.can_moderate_to(Approved));
        assert!(!Hidden.can_moderate_to(Flagged));
        assert!(!Approved.can_moderate_to(Pending));
        assert!(!Approved.can_moderate_to(Approved));

        let request = ModerationRequest { status: Pending, note: None };
        assert!(matches!(request.validate(Approved), Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn test_create_validation() {
        let order_id = uuid::Uuid::new_v4();
        let ok = ReviewCreate {
            order_id,
            rating: 4,
            body: Some("  Lovely eggs  ".to_string()),
        };
        assert_eq!(ok.validate().unwrap(), (4, "Lovely eggs".to_string()));

        let no_body = ReviewCreate { order_id, rating: 1, body: None };
        assert_eq!(no_body.validate().unwrap(), (1, String::new()));

        for bad in [0, 6] {
            let request = ReviewCreate { order_id, rating: bad, body: None };
            assert!(matches!(request.validate(), Err(Error::Validation { .. })));
        }
        let long = ReviewCreate {
            order_id,
            rating: 3,
            body: Some("x".repeat(MAX_BODY_LEN + 1)),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_edit_requires_a_change() {
        assert!(ReviewEdit::default().validate().is_err());
        let edit = ReviewEdit {
            rating: Some(5),
            body: None,
        };
        assert_eq!(edit.validate().unwrap(), (Some(5), None));
    }
}
