//! API models for user reports and their resolution.

use super::pagination::PageQuery;
use super::validation;
use crate::db::models::reports::ReportDBResponse;
use crate::errors::Error;
use crate::types::{ReportId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const MAX_DETAILS_LEN: usize = 2000;
pub const MAX_RESOLUTION_NOTE_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "report_target", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportTarget {
    Product,
    Review,
    User,
    Message,
}

impl fmt::Display for ReportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportTarget::Product => "Product",
            ReportTarget::Review => "Review",
            ReportTarget::User => "User",
            ReportTarget::Message => "Message",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "report_reason", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportReason {
    Spam,
    Inappropriate,
    Fraud,
    Safety,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "report_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Open,
    Resolved,
    Dismissed,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportStatus::Open => "open",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReportCreate {
    pub target_type: ReportTarget,
    #[schema(value_type = String, format = "uuid")]
    pub target_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
}

impl ReportCreate {
    pub fn validate(&self, reporter_id: UserId) -> Result<Option<String>, Error> {
        if self.target_type == ReportTarget::User && self.target_id == reporter_id {
            return Err(Error::BadRequest {
                message: "You cannot report yourself".to_string(),
            });
        }
        validation::optional_text("details", self.details.as_deref(), MAX_DETAILS_LEN)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReportResolution {
    pub status: ReportStatus,
    pub resolution_note: Option<String>,
    /// Only meaningful with `resolved`: hide the reported item
    #[serde(default)]
    pub hide_target: bool,
}

impl ReportResolution {
    pub fn validate(&self, current: ReportStatus) -> Result<Option<String>, Error> {
        if current != ReportStatus::Open || self.status == ReportStatus::Open {
            return Err(Error::InvalidTransition {
                entity: "report".to_string(),
                from: current.to_string(),
                to: self.status.to_string(),
            });
        }
        if self.hide_target && self.status != ReportStatus::Resolved {
            return Err(validation::invalid("hide_target", "only applies when resolving"));
        }
        validation::optional_text("resolution_note", self.resolution_note.as_deref(), MAX_RESOLUTION_NOTE_LEN)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListReportsQuery {
    pub status: Option<ReportStatus>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ReportId,
    #[schema(value_type = String, format = "uuid")]
    pub reporter_id: UserId,
    pub target_type: ReportTarget,
    #[schema(value_type = String, format = "uuid")]
    pub target_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
    pub status: ReportStatus,
    pub resolution_note: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ReportDBResponse> for ReportResponse {
    fn from(db: ReportDBResponse) -> Self {
        Self {
            id: db.id,
            reporter_id: db.reporter_id,
            target_type: db.target_type,
            target_id: db.target_id,
            reason: db.reason,
            details: db.details,
            status: db.status,
            resolution_note: db.resolution_note,
            resolved_by: db.resolved_by,
            resolved_at: db.resolved_at,
            created_at: db.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cannot_report_self() {
        let me = Uuid::new_v4();
        let request = ReportCreate {
            target_type: ReportTarget::User,
            target_id: me,
            reason: ReportReason::Spam,
            details: None,
        };
        assert!(request.validate(me).is_err());
        assert!(request.validate(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_resolution_rules() {
        let resolve = ReportResolution {
            status: ReportStatus::Resolved,
            resolution_note: Some("Listing removed".to_string()),
            hide_target: true,
        };
        assert_eq!(resolve.validate(ReportStatus::Open).unwrap().as_deref(), Some("Listing removed"));
        assert!(matches!(resolve.validate(ReportStatus::Dismissed), Err(Error::InvalidTransition { .. })));

        let dismiss_and_hide = ReportResolution {
            status: ReportStatus::Dismissed,
            resolution_note: None,
            hide_target: true,
        };
        assert!(matches!(dismiss_and_hide.validate(ReportStatus::Open), Err(Error::Validation { .. })));

        let reopen = ReportResolution {
            status: ReportStatus::Open,
            resolution_note: None,
            hide_target: false,
        };
        assert!(reopen.validate(ReportStatus::Open).is_err());
    }

    #[test]
    fn test_wire_names() {
        let request: ReportCreate = serde_json::from_value(serde_json::json!({
            "target_type": "message",
            "target_id": Uuid::nil(),
            "reason": "safety"
        }))
        .unwrap();
        assert_eq!(request.target_type, ReportTarget::Message);
        assert_eq!(request.reason, ReportReason::Safety);
    }
}
