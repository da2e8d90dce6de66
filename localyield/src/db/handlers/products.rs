//! Database repository for products.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::products::{ListingDBResponse, ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest},
};
use crate::types::{ProductId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

const PRODUCT_COLUMNS: &str =
    "id, producer_id, title, description, category, price, unit, stock, zip, image_url, is_archived, created_at, updated_at";

/// Filter for listing a producer's own products
#[derive(Debug, Clone)]
pub struct ProductFilter {
    pub producer_id: Option<UserId>,
    pub include_archived: bool,
    pub skip: i64,
    pub limit: i64,
}

/// Text and category narrowing applied in SQL before distance ranking.
#[derive(Debug, Clone, Default)]
pub struct ListingSearch {
    pub text: Option<String>,
    pub category: Option<String>,
}

pub struct Products<'c> {
    db: &'c mut PgConnection,
}

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
fn like_pattern(text: &str) -> String {
    let escaped = text.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait::async_trait]
impl<'c> Repository for Products<'c> {
    type CreateRequest = ProductCreateDBRequest;
    type UpdateRequest = ProductUpdateDBRequest;
    type Response = ProductDBResponse;
    type Id = ProductId;
    type Filter = ProductFilter;

    #[instrument(skip(self, request), fields(producer_id = %abbrev_uuid(&request.producer_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let product = sqlx::query_as::<_, ProductDBResponse>(&format!(
            r#"
            INSERT INTO products (id, producer_id, title, description, category, price, unit, stock, zip, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.producer_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.category)
        .bind(request.price)
        .bind(&request.unit)
        .bind(request.stock)
        .bind(&request.zip)
        .bind(&request.image_url)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let product = sqlx::query_as::<_, ProductDBResponse>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(product)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let products = sqlx::query_as::<_, ProductDBResponse>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE ($1::uuid IS NULL OR producer_id = $1)
               AND ($2 OR NOT is_archived)
             ORDER BY created_at DESC, id
             LIMIT $3 OFFSET $4"
        ))
        .bind(filter.producer_id)
        .bind(filter.include_archived)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(products)
    }

    /// Archives rather than deletes, so order snapshots keep a valid reference.
    #[instrument(skip(self), fields(product_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET is_archived = TRUE, updated_at = NOW() WHERE id = $1 AND NOT is_archived")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(product_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        sqlx::query_as::<_, ProductDBResponse>(&format!(
            r#"
            UPDATE products SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                category = COALESCE($4, category),
                price = COALESCE($5, price),
                unit = COALESCE($6, unit),
                stock = COALESCE($7, stock),
                zip = COALESCE($8, zip),
                image_url = CASE WHEN $9 THEN $10 ELSE image_url END,
                is_archived = COALESCE($11, is_archived),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.category)
        .bind(request.price)
        .bind(&request.unit)
        .bind(request.stock)
        .bind(&request.zip)
        .bind(request.image_url.is_some())
        .bind(request.image_url.clone().flatten())
        .bind(request.is_archived)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }
}

impl<'c> Products<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Active listings from producers in good standing, narrowed by text and category.
    #[instrument(skip(self, search), err)]
    pub async fn search_listings(&mut self, search: &ListingSearch) -> Result<Vec<ListingDBResponse>> {
        let pattern = search.text.as_deref().filter(|t| !t.trim().is_empty()).map(like_pattern);
        let listings = sqlx::query_as::<_, ListingDBResponse>(
            r#"
            SELECT p.id, p.producer_id, p.title, p.description, p.category, p.price, p.unit, p.stock, p.zip,
                   p.image_url, p.is_archived, p.created_at, p.updated_at,
                   u.display_name AS producer_name
            FROM products p
            JOIN users u ON u.id = p.producer_id
            WHERE NOT p.is_archived
              AND NOT u.is_suspended
              AND ($1::text IS NULL OR p.title ILIKE $1 OR p.description ILIKE $1)
              AND ($2::text IS NULL OR p.category = $2)
            "#,
        )
        .bind(pattern)
        .bind(search.category.as_deref().map(|c| c.trim().to_lowercase()))
        .fetch_all(&mut *self.db)
        .await?;
        Ok(listings)
    }

    /// Lock rows for a checkout, in id order so concurrent checkouts can't deadlock.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn lock_for_checkout(&mut self, ids: &[ProductId]) -> Result<HashMap<ProductId, ProductDBResponse>> {
        let products = sqlx::query_as::<_, ProductDBResponse>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    /// Add `delta` (possibly negative) to stock. The `stock >= 0` check rejects oversells.
    #[instrument(skip(self), fields(product_id = %abbrev_uuid(&id)), err)]
    pub async fn adjust_stock(&mut self, id: ProductId, delta: i32) -> Result<()> {
        sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(delta)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ProductFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE ($1::uuid IS NULL OR producer_id = $1) AND ($2 OR NOT is_archived)",
        )
        .bind(filter.producer_id)
        .bind(filter.include_archived)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    #[instrument(skip(self), err)]
    pub async fn count_active(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE NOT is_archived")
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_product, create_test_user};
    use sqlx::PgPool;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 100%_raw "), "%100\\%\\_raw%");
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_search_excludes_archived_and_filters(pool: PgPool) {
        let producer = create_test_user(&pool, &[Role::Producer]).await;
        let eggs = create_test_product(&pool, producer.id, "Duck eggs", "eggs", 10).await;
        let honey = create_test_product(&pool, producer.id, "Clover honey", "honey", 3).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Products::new(&mut conn);

        let all = repo.search_listings(&ListingSearch::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let by_text = repo
            .search_listings(&ListingSearch {
                text: Some("DUCK".to_string()),
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].product.id, eggs.id);

        assert!(repo.delete(honey.id).await.unwrap());
        assert!(!repo.delete(honey.id).await.unwrap());
        let by_category = repo
            .search_listings(&ListingSearch {
                text: None,
                category: Some("honey".to_string()),
            })
            .await
            .unwrap();
        assert!(by_category.is_empty());
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_stock_cannot_go_negative(pool: PgPool) {
        let producer = create_test_user(&pool, &[Role::Producer]).await;
        let product = create_test_product(&pool, producer.id, "Goat cheese", "dairy", 2).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Products::new(&mut conn);
        repo.adjust_stock(product.id, -2).await.unwrap();
        let err = repo.adjust_stock(product.id, -1).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_update_clears_image(pool: PgPool) {
        let producer = create_test_user(&pool, &[Role::Producer]).await;
        let product = create_test_product(&pool, producer.id, "Tulips", "flowers", 5).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Products::new(&mut conn);
        let with_image = repo
            .update(
                product.id,
                &ProductUpdateDBRequest {
                    image_url: Some(Some("https://cdn.example.com/t.jpg".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(with_image.image_url.is_some());

        let cleared = repo
            .update(
                product.id,
                &ProductUpdateDBRequest {
                    image_url: Some(None),
                    title: Some("Red tulips".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.image_url, None);
        assert_eq!(cleared.title, "Red tulips");
        assert_eq!(cleared.stock, 5);
    }
}
