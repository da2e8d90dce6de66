//! Database repository for custom categories.

use crate::api::models::categories::{CategoryStatus, is_builtin};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::categories::{CategoryCreateDBRequest, CategoryDecisionDBRequest, CustomCategoryDBResponse},
};
use crate::types::{CategoryId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const CATEGORY_COLUMNS: &str = "id, slug, name, status, proposed_by, decided_by, decided_at, created_at";

#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    pub status: Option<CategoryStatus>,
    pub proposed_by: Option<UserId>,
}

pub struct Categories<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Categories<'c> {
    type CreateRequest = CategoryCreateDBRequest;
    type UpdateRequest = CategoryDecisionDBRequest;
    type Response = CustomCategoryDBResponse;
    type Id = CategoryId;
    type Filter = CategoryFilter;

    #[instrument(skip(self, request), fields(slug = %request.slug), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let category = sqlx::query_as::<_, CustomCategoryDBResponse>(&format!(
            "INSERT INTO custom_categories (id, slug, name, proposed_by) VALUES ($1, $2, $3, $4) RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&request.slug)
        .bind(&request.name)
        .bind(request.proposed_by)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(category)
    }

    #[instrument(skip(self), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let category = sqlx::query_as::<_, CustomCategoryDBResponse>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM custom_categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(category)
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let categories = sqlx::query_as::<_, CustomCategoryDBResponse>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM custom_categories
             WHERE ($1::category_status IS NULL OR status = $1)
               AND ($2::uuid IS NULL OR proposed_by = $2)
             ORDER BY name"
        ))
        .bind(filter.status)
        .bind(filter.proposed_by)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(categories)
    }

    #[instrument(skip(self), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM custom_categories WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record an admin decision.
    #[instrument(skip(self, request), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        sqlx::query_as::<_, CustomCategoryDBResponse>(&format!(
            "UPDATE custom_categories SET status = $2, decided_by = $3, decided_at = NOW()
             WHERE id = $1 RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(id)
        .bind(request.status)
        .bind(request.decided_by)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }
}

impl<'c> Categories<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Whether listings may be filed under `slug`: built-in or approved.
    #[instrument(skip(self), err)]
    pub async fn is_selectable(&mut self, slug: &str) -> Result<bool> {
        if is_builtin(slug) {
            return Ok(true);
        }
        let approved: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM custom_categories WHERE slug = $1 AND status = 'approved')",
        )
        .bind(slug)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_user;
    use crate::api::models::users::Role;
    use sqlx::PgPool;

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_only_approved_customs_are_selectable(pool: PgPool) {
        let producer = create_test_user(&pool, &[Role::Producer]).await;
        let admin = create_test_user(&pool, &[Role::Admin]).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Categories::new(&mut conn);

        assert!(repo.is_selectable("eggs").await.unwrap());

        let proposal = repo
            .create(&CategoryCreateDBRequest {
                slug: "maple-syrup".to_string(),
                name: "Maple syrup".to_string(),
                proposed_by: producer.id,
            })
            .await
            .unwrap();
        assert_eq!(proposal.status, CategoryStatus::Pending);
        assert!(!repo.is_selectable("maple-syrup").await.unwrap());

        repo.update(
            proposal.id,
            &CategoryDecisionDBRequest {
                status: CategoryStatus::Approved,
                decided_by: admin.id,
            },
        )
        .await
        .unwrap();
        assert!(repo.is_selectable("maple-syrup").await.unwrap());

        let pending = repo
            .list(&CategoryFilter {
                status: Some(CategoryStatus::Pending),
                proposed_by: None,
            })
            .await
            .unwrap();
        assert!(pending.is_empty());
    }
}
