//! Database repository for orders.

use crate::api::models::orders::{OrderStatus, PlannedOrder};
use crate::db::{
    errors::{DbError, Result},
    models::orders::{OrderDBResponse, OrderItemDBResponse, OrderStatusCount},
};
use crate::types::{OrderId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, buyer_id, producer_id, status, subtotal, note, created_at, updated_at, fulfilled_at, canceled_at";
const ITEM_COLUMNS: &str = "order_id, product_id, title, unit, unit_price, quantity, line_total";

/// Which side of the order the caller is listing from.
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub buyer_id: Option<UserId>,
    pub producer_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub skip: i64,
    pub limit: i64,
}

pub struct Orders<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Orders<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert an order and its line snapshots. Stock is the caller's business.
    #[instrument(skip(self, planned, note), fields(buyer_id = %abbrev_uuid(&buyer_id), producer_id = %abbrev_uuid(&planned.producer_id)), err)]
    pub async fn create(&mut self, buyer_id: UserId, planned: &PlannedOrder, note: Option<&str>) -> Result<(OrderDBResponse, Vec<OrderItemDBResponse>)> {
        let order = sqlx::query_as::<_, OrderDBResponse>(&format!(
            r#"
            INSERT INTO orders (id, buyer_id, producer_id, subtotal, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(buyer_id)
        .bind(planned.producer_id)
        .bind(planned.subtotal)
        .bind(note)
        .fetch_one(&mut *self.db)
        .await?;

        let mut items = Vec::with_capacity(planned.lines.len());
        for line in &planned.lines {
            let item = sqlx::query_as::<_, OrderItemDBResponse>(&format!(
                r#"
                INSERT INTO order_items (id, order_id, product_id, title, unit, unit_price, quantity, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING {ITEM_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(line.product_id)
            .bind(&line.title)
            .bind(&line.unit)
            .bind(line.unit_price)
            .bind(line.quantity)
            .bind(line.line_total)
            .fetch_one(&mut *self.db)
            .await?;
            items.push(item);
        }

        Ok((order, items))
    }

    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: OrderId) -> Result<Option<OrderDBResponse>> {
        let order = sqlx::query_as::<_, OrderDBResponse>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(order)
    }

    /// Row-locked read used before a status change.
    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&id)), err)]
    pub async fn lock(&mut self, id: OrderId) -> Result<Option<OrderDBResponse>> {
        let order = sqlx::query_as::<_, OrderDBResponse>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&id)), err)]
    pub async fn items(&mut self, id: OrderId) -> Result<Vec<OrderItemDBResponse>> {
        let items = sqlx::query_as::<_, OrderItemDBResponse>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY title, product_id"
        ))
        .bind(id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(items)
    }

    /// Items for many orders at once, grouped by order.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn items_for(&mut self, ids: &[OrderId]) -> Result<HashMap<OrderId, Vec<OrderItemDBResponse>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let items = sqlx::query_as::<_, OrderItemDBResponse>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY title, product_id"
        ))
        .bind(ids)
        .fetch_all(&mut *self.db)
        .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderItemDBResponse>> = HashMap::new();
        for item in items {
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &OrderFilter) -> Result<Vec<OrderDBResponse>> {
        let orders = sqlx::query_as::<_, OrderDBResponse>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE ($1::uuid IS NULL OR buyer_id = $1)
               AND ($2::uuid IS NULL OR producer_id = $2)
               AND ($3::order_status IS NULL OR status = $3)
             ORDER BY created_at DESC, id
             LIMIT $4 OFFSET $5"
        ))
        .bind(filter.buyer_id)
        .bind(filter.producer_id)
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(orders)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &OrderFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders
             WHERE ($1::uuid IS NULL OR buyer_id = $1)
               AND ($2::uuid IS NULL OR producer_id = $2)
               AND ($3::order_status IS NULL OR status = $3)",
        )
        .bind(filter.buyer_id)
        .bind(filter.producer_id)
        .bind(filter.status)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Move to `status`, stamping `fulfilled_at` / `canceled_at` when entering those states.
    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&id), status = %status), err)]
    pub async fn set_status(&mut self, id: OrderId, status: OrderStatus) -> Result<OrderDBResponse> {
        sqlx::query_as::<_, OrderDBResponse>(&format!(
            r#"
            UPDATE orders SET
                status = $2,
                fulfilled_at = CASE WHEN $2 = 'fulfilled'::order_status THEN NOW() ELSE fulfilled_at END,
                canceled_at = CASE WHEN $2 = 'canceled'::order_status THEN NOW() ELSE canceled_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)
    }

    /// Put the quantities of a canceled order back on the shelf.
    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&id)), err)]
    pub async fn restock(&mut self, id: OrderId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products p SET stock = p.stock + totals.quantity, updated_at = NOW()
            FROM (SELECT product_id, SUM(quantity)::int AS quantity FROM order_items WHERE order_id = $1 GROUP BY product_id) totals
            WHERE p.id = totals.product_id
            "#,
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    pub async fn count_by_status(&mut self) -> Result<Vec<OrderStatusCount>> {
        let counts = sqlx::query_as::<_, OrderStatusCount>("SELECT status, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status")
            .fetch_all(&mut *self.db)
            .await?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::orders::PlannedLine;
    use crate::api::models::users::Role;
    use crate::db::handlers::Products;
    use crate::db::handlers::repository::Repository;
    use crate::test_utils::{create_test_product, create_test_user};
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_create_cancel_restock(pool: PgPool) {
        let buyer = create_test_user(&pool, &[Role::Buyer]).await;
        let producer = create_test_user(&pool, &[Role::Producer]).await;
        let product = create_test_product(&pool, producer.id, "Heirloom tomatoes", "produce", 10).await;

        let mut conn = pool.acquire().await.unwrap();
        Products::new(&mut conn).adjust_stock(product.id, -3).await.unwrap();

        let planned = PlannedOrder {
            producer_id: producer.id,
            lines: vec![PlannedLine {
                product_id: product.id,
                title: product.title.clone(),
                unit: product.unit.clone(),
                unit_price: product.price,
                quantity: 3,
                line_total: product.price * Decimal::from(3),
            }],
            subtotal: product.price * Decimal::from(3),
        };

        let mut repo = Orders::new(&mut conn);
        let (order, items) = repo.create(buyer.id, &planned, Some("porch pickup")).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(items.len(), 1);

        let listed = repo
            .list(&OrderFilter {
                buyer_id: Some(buyer.id),
                producer_id: None,
                status: None,
                skip: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let canceled = repo.set_status(order.id, OrderStatus::Canceled).await.unwrap();
        assert!(canceled.canceled_at.is_some());
        assert_eq!(repo.restock(order.id).await.unwrap(), 1);

        let after = Products::new(&mut conn).get_by_id(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 10);
    }
}
