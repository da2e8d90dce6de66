//! API request/response models for product listings.

use super::validation;
use crate::db::models::products::{ListingDBResponse, ProductDBResponse};
use crate::errors::Error;
use crate::search::{Searchable, SortOrder};
use crate::types::{ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_UNIT_LEN: usize = 30;
pub const MAX_STOCK: i32 = 100_000;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProductCreate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Built-in or approved custom category slug
    pub category: String,
    #[schema(value_type = String, example = "6.50")]
    pub price: Decimal,
    /// e.g. "dozen", "lb", "jar"
    pub unit: String,
    pub stock: i32,
    /// Defaults to the producer's profile ZIP
    pub zip: Option<String>,
    pub image_url: Option<String>,
}

/// A create request after field validation. Category existence is checked separately.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidProductCreate {
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub unit: String,
    pub stock: i32,
    pub zip: Option<String>,
    pub image_url: Option<String>,
}

fn category_slug(value: &str) -> Result<String, Error> {
    let slug = value.trim().to_lowercase();
    if slug.is_empty() {
        return Err(validation::invalid("category", "must not be empty"));
    }
    Ok(slug)
}

impl ProductCreate {
    pub fn validate(&self) -> Result<ValidProductCreate, Error> {
        Ok(ValidProductCreate {
            title: validation::text("title", &self.title, 1, MAX_TITLE_LEN)?,
            description: validation::optional_text("description", Some(&self.description), MAX_DESCRIPTION_LEN)?.unwrap_or_default(),
            category: category_slug(&self.category)?,
            price: validation::money("price", self.price)?,
            unit: validation::text("unit", &self.unit, 1, MAX_UNIT_LEN)?,
            stock: validation::range("stock", self.stock, 0, MAX_STOCK)?,
            zip: self.zip.as_deref().map(|zip| validation::zip("zip", zip)).transpose()?,
            image_url: self.image_url.as_deref().map(|url| validation::http_url("image_url", url)).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    pub unit: Option<String>,
    pub stock: Option<i32>,
    pub zip: Option<String>,
    /// `null` removes the image
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub image_url: Option<Option<String>>,
}

impl ProductUpdate {
    pub fn validate(&self) -> Result<ProductUpdate, Error> {
        Ok(ProductUpdate {
            title: self.title.as_deref().map(|t| validation::text("title", t, 1, MAX_TITLE_LEN)).transpose()?,
            description: self
                .description
                .as_deref()
                .map(|d| validation::optional_text("description", Some(d), MAX_DESCRIPTION_LEN).map(Option::unwrap_or_default))
                .transpose()?,
            category: self.category.as_deref().map(category_slug).transpose()?,
            price: self.price.map(|p| validation::money("price", p)).transpose()?,
            unit: self.unit.as_deref().map(|u| validation::text("unit", u, 1, MAX_UNIT_LEN)).transpose()?,
            stock: self.stock.map(|s| validation::range("stock", s, 0, MAX_STOCK)).transpose()?,
            zip: self.zip.as_deref().map(|z| validation::zip("zip", z)).transpose()?,
            image_url: match &self.image_url {
                Some(Some(url)) => Some(Some(validation::http_url("image_url", url)?)),
                Some(None) => Some(None),
                None => None,
            },
        })
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.price.is_none()
            && self.unit.is_none()
            && self.stock.is_none()
            && self.zip.is_none()
            && self.image_url.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProductId,
    #[schema(value_type = String, format = "uuid")]
    pub producer_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub unit: String,
    pub stock: i32,
    pub zip: String,
    pub image_url: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductDBResponse> for ProductResponse {
    fn from(db: ProductDBResponse) -> Self {
        Self {
            id: db.id,
            producer_id: db.producer_id,
            title: db.title,
            description: db.description,
            category: db.category,
            price: db.price,
            unit: db.unit,
            stock: db.stock,
            zip: db.zip,
            image_url: db.image_url,
            is_archived: db.is_archived,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Query parameters for `GET /api/listings`
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListingQuery {
    /// Case-insensitive substring of title or description
    pub q: Option<String>,
    pub category: Option<String>,
    /// Searcher's ZIP; enables distance filtering
    pub zip: Option<String>,
    /// Miles from `zip` (default and maximum come from configuration)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub radius: Option<f64>,
    /// `distance` (default with a ZIP), `newest` (default otherwise), `price_asc`, `price_desc`
    pub sort: Option<SortOrder>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: super::pagination::PageQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListingResponse {
    #[serde(flatten)]
    pub product: ProductResponse,
    pub producer_name: Option<String>,
    /// Miles from the searcher's ZIP, when both ZIPs are known
    pub distance_miles: Option<f64>,
}

impl Searchable for ListingDBResponse {
    fn id(&self) -> Uuid {
        self.product.id
    }
    fn zip(&self) -> &str {
        &self.product.zip
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.product.created_at
    }
    fn price(&self) -> Decimal {
        self.product.price
    }
}

impl ListingResponse {
    pub fn new(listing: ListingDBResponse, distance_miles: Option<f64>) -> Self {
        Self {
            product: listing.product.into(),
            producer_name: listing.producer_name,
            distance_miles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn create() -> ProductCreate {
        ProductCreate {
            title: " Duck eggs ".to_string(),
            description: String::new(),
            category: "Eggs".to_string(),
            price: Decimal::from_str("7.00").unwrap(),
            unit: "dozen".to_string(),
            stock: 12,
            zip: Some("05401-0001".to_string()),
            image_url: None,
        }
    }

    #[test]
    fn test_create_normalizes() {
        let valid = create().validate().unwrap();
        assert_eq!(valid.title, "Duck eggs");
        assert_eq!(valid.category, "eggs");
        assert_eq!(valid.zip.as_deref(), Some("05401"));
    }

    #[test]
    fn test_create_field_errors() {
        let cases: Vec<(ProductCreate, &str)> = vec![
            (ProductCreate { title: "".into(), ..create() }, "title"),
            (ProductCreate { title: "x".repeat(121), ..create() }, "title"),
            (ProductCreate { price: Decimal::ZERO, ..create() }, "price"),
            (ProductCreate { price: Decimal::from_str("1.999").unwrap(), ..create() }, "price"),
            (ProductCreate { stock: -1, ..create() }, "stock"),
            (ProductCreate { zip: Some("1234".into()), ..create() }, "zip"),
            (ProductCreate { description: "d".repeat(5001), ..create() }, "description"),
            (ProductCreate { image_url: Some("ftp://x".into()), ..create() }, "image_url"),
        ];
        for (request, expected) in cases {
            match request.validate() {
                Err(Error::Validation { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {expected} to fail, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_update_image_url_null_vs_absent() {
        let clear: ProductUpdate = serde_json::from_value(serde_json::json!({"image_url": null})).unwrap();
        assert_eq!(clear.image_url, Some(None));
        assert!(!clear.is_empty());

        let absent: ProductUpdate = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(absent.image_url, None);
        assert!(absent.is_empty());
    }

    #[test]
    fn test_listing_query_from_strings() {
        let query: ListingQuery = serde_json::from_value(serde_json::json!({
            "zip": "05401", "radius": "12.5", "sort": "price_asc", "page": "2"
        }))
        .unwrap();
        assert_eq!(query.radius, Some(12.5));
        assert_eq!(query.sort, Some(SortOrder::PriceAsc));
        assert_eq!(query.page.page(), 2);
    }
}
