//! Database repository for reports.

use crate::api::models::reports::{ReportStatus, ReportTarget};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::reports::{ReportCreateDBRequest, ReportDBResponse, ReportResolutionDBRequest},
};
use crate::types::{ReportId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const REPORT_COLUMNS: &str =
    "id, reporter_id, target_type, target_id, reason, details, status, resolution_note, resolved_by, resolved_at, created_at";

#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub skip: i64,
    pub limit: i64,
}

pub struct Reports<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Reports<'c> {
    type CreateRequest = ReportCreateDBRequest;
    type UpdateRequest = ReportResolutionDBRequest;
    type Response = ReportDBResponse;
    type Id = ReportId;
    type Filter = ReportFilter;

    /// A second open report of the same target by the same reporter fails with `reports_open_unique`.
    #[instrument(skip(self, request), fields(target_type = %request.target_type, target_id = %abbrev_uuid(&request.target_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let report = sqlx::query_as::<_, ReportDBResponse>(&format!(
            r#"
            INSERT INTO reports (id, reporter_id, target_type, target_id, reason, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.reporter_id)
        .bind(request.target_type)
        .bind(request.target_id)
        .bind(request.reason)
        .bind(&request.details)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(report)
    }

    #[instrument(skip(self), fields(report_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let report = sqlx::query_as::<_, ReportDBResponse>(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(report)
    }

    /// Oldest first, so the moderation queue is worked in arrival order.
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let reports = sqlx::query_as::<_, ReportDBResponse>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports
             WHERE ($1::report_status IS NULL OR status = $1)
             ORDER BY created_at, id
             LIMIT $2 OFFSET $3"
        ))
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(reports)
    }

    #[instrument(skip(self), fields(report_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close an open report. Already-closed reports are left untouched and yield `NotFound`.
    #[instrument(skip(self, request), fields(report_id = %abbrev_uuid(&id), status = %request.status), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        sqlx::query_as::<_, ReportDBResponse>(&format!(
            r#"
            UPDATE reports SET status = $2, resolution_note = $3, resolved_by = $4, resolved_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.status)
        .bind(&request.resolution_note)
        .bind(request.resolved_by)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }
}

impl<'c> Reports<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self, status: Option<ReportStatus>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE ($1::report_status IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    /// Whether the reported item exists.
    #[instrument(skip(self), fields(target_id = %abbrev_uuid(&target_id)), err)]
    pub async fn target_exists(&mut self, target_type: ReportTarget, target_id: Uuid) -> Result<bool> {
        let sql = match target_type {
            ReportTarget::Product => "SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)",
            ReportTarget::Review => "SELECT EXISTS (SELECT 1 FROM reviews WHERE id = $1)",
            ReportTarget::User => "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)",
            ReportTarget::Message => "SELECT EXISTS (SELECT 1 FROM messages WHERE id = $1)",
        };
        let exists: bool = sqlx::query_scalar(sql).bind(target_id).fetch_one(&mut *self.db).await?;
        Ok(exists)
    }
}
