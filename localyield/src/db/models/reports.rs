//! Database models for reports.

use crate::api::models::reports::{ReportReason, ReportStatus, ReportTarget};
use crate::types::{ReportId, UserId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReportCreateDBRequest {
    pub reporter_id: UserId,
    pub target_type: ReportTarget,
    pub target_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportResolutionDBRequest {
    pub status: ReportStatus,
    pub resolution_note: Option<String>,
    pub resolved_by: UserId,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReportDBResponse {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub target_type: ReportTarget,
    pub target_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
    pub status: ReportStatus,
    pub resolution_note: Option<String>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
