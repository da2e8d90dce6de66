//! API models for checkout and the order lifecycle.
//!
//! # Status machine
//!
//! ```text
//! pending ──► confirmed ──► ready ──► fulfilled ──► completed
//!    │            │
//!    └────────────┴──► canceled
//! ```
//!
//! The producer confirms, readies and fulfils. The buyer may cancel while the order is `pending`,
//! the producer while it is `pending` or `confirmed`. The buyer completes a fulfilled order.
//! Admins may make any allowed move.

use super::pagination::PageQuery;
use super::validation;
use crate::db::models::orders::{OrderDBResponse, OrderItemDBResponse};
use crate::db::models::products::ProductDBResponse;
use crate::errors::Error;
use crate::types::{OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use utoipa::{IntoParams, ToSchema};

pub const MAX_NOTE_LEN: usize = 1000;
pub const MAX_LINE_QUANTITY: i32 = 99;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Ready,
    Fulfilled,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Ready,
        OrderStatus::Fulfilled,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Ready => "ready",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Canceled) | (Confirmed, Ready) | (Confirmed, Canceled) | (Ready, Fulfilled) | (Fulfilled, Completed)
        )
    }

    /// Orders in these states can be reviewed and can have issues raised on them.
    pub fn is_delivered(&self) -> bool {
        matches!(self, OrderStatus::Fulfilled | OrderStatus::Completed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderActor {
    Buyer,
    Producer,
    Admin,
}

impl OrderActor {
    pub fn for_order(order: &OrderDBResponse, user_id: UserId, is_admin: bool) -> Option<Self> {
        if order.producer_id == user_id {
            Some(OrderActor::Producer)
        } else if order.buyer_id == user_id {
            Some(OrderActor::Buyer)
        } else if is_admin {
            Some(OrderActor::Admin)
        } else {
            None
        }
    }
}

/// Check a requested move against the status machine and the caller's part in the order.
pub fn authorize_transition(from: OrderStatus, to: OrderStatus, actor: OrderActor) -> Result<(), Error> {
    if !from.can_transition_to(to) {
        return Err(Error::InvalidTransition {
            entity: "order".to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    use OrderStatus::*;
    let permitted = match actor {
        OrderActor::Admin => true,
        OrderActor::Producer => matches!(to, Confirmed | Ready | Fulfilled | Canceled),
        OrderActor::Buyer => matches!((from, to), (Pending, Canceled) | (Fulfilled, Completed)),
    };
    if !permitted {
        return Err(Error::InsufficientPermissions {
            action: crate::types::Operation::Update,
            resource: crate::types::Resource::Orders,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct CheckoutItem {
    #[schema(value_type = String, format = "uuid")]
    pub product_id: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Omit to check out the cart
    pub items: Option<Vec<CheckoutItem>>,
    pub note: Option<String>,
}

impl CheckoutRequest {
    /// Merge repeated products and bound quantities.
    pub fn validate_items(items: &[CheckoutItem], max_lines: usize) -> Result<Vec<CheckoutItem>, Error> {
        if items.is_empty() {
            return Err(Error::BadRequest {
                message: "Nothing to check out".to_string(),
            });
        }
        let mut merged: BTreeMap<ProductId, i32> = BTreeMap::new();
        for item in items {
            validation::range("quantity", item.quantity, 1, MAX_LINE_QUANTITY)?;
            *merged.entry(item.product_id).or_default() += item.quantity;
        }
        if merged.len() > max_lines {
            return Err(validation::invalid("items", format!("at most {max_lines} different products per order")));
        }
        merged
            .into_iter()
            .map(|(product_id, quantity)| {
                validation::range("quantity", quantity, 1, MAX_LINE_QUANTITY)?;
                Ok(CheckoutItem { product_id, quantity })
            })
            .collect()
    }

    pub fn validated_note(&self) -> Result<Option<String>, Error> {
        validation::optional_text("note", self.note.as_deref(), MAX_NOTE_LEN)
    }
}

/// One order line with the price frozen at checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLine {
    pub product_id: ProductId,
    pub title: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub producer_id: UserId,
    pub lines: Vec<PlannedLine>,
    pub subtotal: Decimal,
}

/// Check every line against the locked products and group the lines into one order per producer.
///
/// Fails on the first missing or archived product, own product, or line that asks for more than is
/// in stock. Nothing is written here, so a failure leaves no trace.
pub fn plan_checkout(
    items: &[CheckoutItem],
    products: &HashMap<ProductId, ProductDBResponse>,
    buyer_id: UserId,
) -> Result<Vec<PlannedOrder>, Error> {
    let mut by_producer: BTreeMap<UserId, Vec<PlannedLine>> = BTreeMap::new();

    for item in items {
        let product = products
            .get(&item.product_id)
            .filter(|p| !p.is_archived)
            .ok_or_else(|| Error::NotFound {
                resource: "Product".to_string(),
                id: item.product_id.to_string(),
            })?;

        if product.producer_id == buyer_id {
            return Err(Error::BadRequest {
                message: format!("You cannot buy your own listing '{}'", product.title),
            });
        }
        if product.stock < item.quantity {
            return Err(Error::InsufficientStock {
                product_id: product.id,
                title: product.title.clone(),
                requested: item.quantity,
                available: product.stock,
            });
        }

        by_producer.entry(product.producer_id).or_default().push(PlannedLine {
            product_id: product.id,
            title: product.title.clone(),
            unit: product.unit.clone(),
            unit_price: product.price,
            quantity: item.quantity,
            line_total: product.price * Decimal::from(item.quantity),
        });
    }

    Ok(by_producer
        .into_iter()
        .map(|(producer_id, lines)| PlannedOrder {
            producer_id,
            subtotal: lines.iter().map(|line| line.line_total).sum(),
            lines,
        })
        .collect())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderIssue {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderView {
    #[default]
    Buyer,
    Producer,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListOrdersQuery {
    /// Orders the caller placed (`buyer`, default) or received (`producer`)
    #[serde(rename = "as")]
    #[param(rename = "as")]
    pub view: Option<OrderView>,
    pub status: Option<OrderStatus>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: PageQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    #[schema(value_type = String, format = "uuid")]
    pub product_id: ProductId,
    pub title: String,
    pub unit: String,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub line_total: Decimal,
}

impl From<OrderItemDBResponse> for OrderItemResponse {
    fn from(db: OrderItemDBResponse) -> Self {
        Self {
            product_id: db.product_id,
            title: db.title,
            unit: db.unit,
            unit_price: db.unit_price,
            quantity: db.quantity,
            line_total: db.line_total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: OrderId,
    #[schema(value_type = String, format = "uuid")]
    pub buyer_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub producer_id: UserId,
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    pub note: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl OrderResponse {
    pub fn new(order: OrderDBResponse, items: Vec<OrderItemDBResponse>) -> Self {
        Self {
            id: order.id,
            buyer_id: order.buyer_id,
            producer_id: order.producer_id,
            status: order.status,
            subtotal: order.subtotal,
            note: order.note,
            items: items.into_iter().map(Into::into).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            fulfilled_at: order.fulfilled_at,
            canceled_at: order.canceled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn product(producer_id: UserId, price: &str, stock: i32) -> ProductDBResponse {
        ProductDBResponse {
            id: Uuid::new_v4(),
            producer_id,
            title: "Raw honey".to_string(),
            description: String::new(),
            category: "honey".to_string(),
            price: Decimal::from_str(price).unwrap(),
            unit: "jar".to_string(),
            stock,
            zip: "05401".to_string(),
            image_url: None,
            is_archived: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn index(products: &[ProductDBResponse]) -> HashMap<ProductId, ProductDBResponse> {
        products.iter().map(|p| (p.id, p.clone())).collect()
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        let all = [Pending, Confirmed, Ready, Fulfilled, Completed, Canceled];
        let allowed: Vec<(OrderStatus, OrderStatus)> = all
            .iter()
            .flat_map(|from| all.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            allowed,
            vec![
                (Pending, Confirmed),
                (Pending, Canceled),
                (Confirmed, Ready),
                (Confirmed, Canceled),
                (Ready, Fulfilled),
                (Fulfilled, Completed),
            ]
        );
    }

    #[test]
    fn test_actor_permissions() {
        use OrderStatus::*;
        assert!(authorize_transition(Pending, Canceled, OrderActor::Buyer).is_ok());
        assert!(matches!(
            authorize_transition(Confirmed, Canceled, OrderActor::Buyer),
            Err(Error::InsufficientPermissions { .. })
        ));
        assert!(authorize_transition(Confirmed, Canceled, OrderActor::Producer).is_ok());
        assert!(authorize_transition(Pending, Confirmed, OrderActor::Buyer).is_err());
        assert!(authorize_transition(Fulfilled, Completed, OrderActor::Buyer).is_ok());
        assert!(authorize_transition(Fulfilled, Completed, OrderActor::Producer).is_err());
        assert!(matches!(
            authorize_transition(Ready, Canceled, OrderActor::Admin),
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_plan_splits_by_producer_and_snapshots_prices() {
        let buyer = Uuid::new_v4();
        let (farm_a, farm_b) = (Uuid::new_v4(), Uuid::new_v4());
        let honey = product(farm_a, "8.00", 5);
        let wax = product(farm_a, "2.50", 5);
        let eggs = product(farm_b, "6.00", 5);
        let products = index(&[honey.clone(), wax.clone(), eggs.clone()]);

        let items = [
            CheckoutItem { product_id: honey.id, quantity: 2 },
            CheckoutItem { product_id: eggs.id, quantity: 1 },
            CheckoutItem { product_id: wax.id, quantity: 4 },
        ];
        let plan = plan_checkout(&items, &products, buyer).unwrap();
        assert_eq!(plan.len(), 2);

        let a = plan.iter().find(|o| o.producer_id == farm_a).unwrap();
        assert_eq!(a.lines.len(), 2);
        assert_eq!(a.subtotal, Decimal::from_str("26.00").unwrap());
        let b = plan.iter().find(|o| o.producer_id == farm_b).unwrap();
        assert_eq!(b.subtotal, Decimal::from_str("6.00").unwrap());
        assert_eq!(b.lines[0].unit_price, eggs.price);
    }

    #[test]
    fn test_plan_rejections() {
        let buyer = Uuid::new_v4();
        let farm = Uuid::new_v4();
        let scarce = product(farm, "5.00", 1);
        let mut archived = product(farm, "5.00", 10);
        archived.is_archived = true;
        let own = product(buyer, "5.00", 10);
        let products = index(&[scarce.clone(), archived.clone(), own.clone()]);

        let stock_err = plan_checkout(&[CheckoutItem { product_id: scarce.id, quantity: 2 }], &products, buyer);
        match stock_err {
            Err(Error::InsufficientStock { product_id, available, .. }) => {
                assert_eq!(product_id, scarce.id);
                assert_eq!(available, 1);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert!(matches!(
            plan_checkout(&[CheckoutItem { product_id: archived.id, quantity: 1 }], &products, buyer),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            plan_checkout(&[CheckoutItem { product_id: Uuid::new_v4(), quantity: 1 }], &products, buyer),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            plan_checkout(&[CheckoutItem { product_id: own.id, quantity: 1 }], &products, buyer),
            Err(Error::BadRequest { .. })
        ));
    }

    #[test]
    fn test_validate_items_merges_duplicates() {
        let id = Uuid::new_v4();
        let merged = CheckoutRequest::validate_items(
            &[CheckoutItem { product_id: id, quantity: 2 }, CheckoutItem { product_id: id, quantity: 3 }],
            10,
        )
        .unwrap();
        assert_eq!(merged, vec![CheckoutItem { product_id: id, quantity: 5 }]);

        assert!(CheckoutRequest::validate_items(&[], 10).is_err());
        assert!(CheckoutRequest::validate_items(&[CheckoutItem { product_id: id, quantity: 0 }], 10).is_err());
        let too_many: Vec<_> = (0..3).map(|_| CheckoutItem { product_id: Uuid::new_v4(), quantity: 1 }).collect();
        assert!(CheckoutRequest::validate_items(&too_many, 2).is_err());
    }

    #[test]
    fn test_list_query_as_param() {
        let query: ListOrdersQuery = serde_json::from_value(serde_json::json!({"as": "producer", "status": "ready"})).unwrap();
        assert_eq!(query.view, Some(OrderView::Producer));
        assert_eq!(query.status, Some(OrderStatus::Ready));
    }
}
