//! Distance filtering and ordering for listing and caregiver search.
//!
//! Candidates come out of the database already filtered by text and category; this module attaches
//! a distance from the searcher's ZIP, drops anything outside the radius, and orders the rest. The
//! whole candidate set is ranked before pagination so `total` counts what survived the radius.

use crate::api::models::validation;
use crate::config::GeoConfig;
use crate::errors::Error;
use crate::geo::{ZipDirectory, normalize_zip};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Nearest first; unknown distances last
    Distance,
    Newest,
    PriceAsc,
    PriceDesc,
}

/// Anything search can place on a map and order.
pub trait Searchable {
    fn id(&self) -> Uuid;
    fn zip(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn price(&self) -> Decimal;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub distance_miles: Option<f64>,
}

/// Where the searcher is and how far they'll go.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    /// Normalized 5-digit ZIP
    pub zip: String,
    pub radius_miles: f64,
}

impl Origin {
    /// Build the search origin from query parameters.
    ///
    /// A ZIP, when given, must be well formed. The radius defaults to `default_radius_miles` and is
    /// capped at `max_radius_miles`; a radius without a ZIP is ignored.
    pub fn from_query(zip: Option<&str>, radius: Option<f64>, geo: &GeoConfig) -> Result<Option<Origin>, Error> {
        let Some(zip) = zip.filter(|z| !z.trim().is_empty()) else {
            return Ok(None);
        };
        let zip = normalize_zip(zip).ok_or_else(|| validation::invalid("zip", "must be a 5-digit US ZIP code"))?;
        let radius_miles = match radius {
            Some(r) if !r.is_finite() || r <= 0.0 => return Err(validation::invalid("radius", "must be a positive number of miles")),
            Some(r) => r.min(geo.max_radius_miles),
            None => geo.default_radius_miles,
        };
        Ok(Some(Origin { zip, radius_miles }))
    }
}

impl SortOrder {
    /// Nearest first when searching from a ZIP, newest first otherwise.
    pub fn resolve(requested: Option<SortOrder>, origin: Option<&Origin>) -> SortOrder {
        requested.unwrap_or(if origin.is_some() { SortOrder::Distance } else { SortOrder::Newest })
    }
}

/// Attach distances, apply the radius and sort.
///
/// With no origin, or an origin ZIP the directory doesn't know, nothing is filtered and every
/// distance is `None`. Otherwise candidates with an unknown ZIP or beyond the radius are dropped.
pub fn rank<T: Searchable>(candidates: Vec<T>, zips: &ZipDirectory, origin: Option<&Origin>, sort: SortOrder) -> Vec<Ranked<T>> {
    let center = origin.and_then(|o| zips.lookup(&o.zip).map(|point| (point, o.radius_miles)));

    let mut ranked: Vec<Ranked<T>> = match center {
        Some((center, radius)) => candidates
            .into_iter()
            .filter_map(|item| {
                let point = zips.lookup(item.zip())?;
                let distance = crate::geo::haversine_miles(center, point);
                (distance <= radius).then_some(Ranked {
                    item,
                    distance_miles: Some(round_miles(distance)),
                })
            })
            .collect(),
        None => candidates
            .into_iter()
            .map(|item| Ranked {
                item,
                distance_miles: None,
            })
            .collect(),
    };

    ranked.sort_by(|a, b| compare(a, b, sort));
    ranked
}

fn round_miles(miles: f64) -> f64 {
    (miles * 10.0).round() / 10.0
}

fn newest_first<T: Searchable>(a: &Ranked<T>, b: &Ranked<T>) -> Ordering {
    b.item
        .created_at()
        .cmp(&a.item.created_at())
        .then_with(|| a.item.id().cmp(&b.item.id()))
}

fn compare<T: Searchable>(a: &Ranked<T>, b: &Ranked<T>, sort: SortOrder) -> Ordering {
    let primary = match sort {
        SortOrder::Distance => match (a.distance_miles, b.distance_miles) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortOrder::Newest => Ordering::Equal,
        SortOrder::PriceAsc => a.item.price().cmp(&b.item.price()),
        SortOrder::PriceDesc => b.item.price().cmp(&a.item.price()),
    };
    primary.then_with(|| newest_first(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;
    use chrono::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Uuid,
        zip: &'static str,
        age_days: i64,
        price: i64,
    }

    impl Searchable for Item {
        fn id(&self) -> Uuid {
            self.id
        }
        fn zip(&self) -> &str {
            self.zip
        }
        fn created_at(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH + Duration::days(1000 - self.age_days)
        }
        fn price(&self) -> Decimal {
            Decimal::from(self.price)
        }
    }

    fn item(n: u128, zip: &'static str, age_days: i64, price: i64) -> Item {
        Item {
            id: Uuid::from_u128(n),
            zip,
            age_days,
            price,
        }
    }

    fn directory() -> ZipDirectory {
        [
            ("05401", 44.4759, -73.2121), // Burlington
            ("05602", 44.2601, -72.5754), // Montpelier, ~36 mi
            ("05701", 43.6106, -72.9726), // Rutland, ~61 mi
            ("10001", 40.7506, -73.9972), // New York, ~260 mi
        ]
        .into_iter()
        .map(|(zip, lat, lng)| (zip.to_string(), LatLng { lat, lng }))
        .collect()
    }

    fn ids<T: Searchable>(ranked: &[Ranked<T>]) -> Vec<u128> {
        ranked.iter().map(|r| r.item.id().as_u128()).collect()
    }

    fn origin(zip: &str, radius: f64) -> Origin {
        Origin {
            zip: zip.to_string(),
            radius_miles: radius,
        }
    }

    #[test]
    fn test_radius_drops_far_and_unknown() {
        let items = vec![
            item(1, "05602", 1, 5),
            item(2, "10001", 1, 5),
            item(3, "99999", 1, 5),
            item(4, "05401", 1, 5),
        ];
        let ranked = rank(items, &directory(), Some(&origin("05401", 50.0)), SortOrder::Distance);
        assert_eq!(ids(&ranked), vec![4, 1]);
        assert_eq!(ranked[0].distance_miles, Some(0.0));
        let montpelier = ranked[1].distance_miles.unwrap();
        assert!((30.0..45.0).contains(&montpelier), "got {montpelier}");
    }

    #[test]
    fn test_unknown_origin_applies_no_filter() {
        let items = vec![item(1, "05602", 3, 5), item(2, "10001", 1, 5), item(3, "99999", 2, 5)];
        let ranked = rank(items, &directory(), Some(&origin("88888", 1.0)), SortOrder::Distance);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|r| r.distance_miles.is_none()));
        // all distances unknown, so newest first
        assert_eq!(ids(&ranked), vec![2, 3, 1]);
    }

    #[test]
    fn test_no_origin_keeps_everything() {
        let items = vec![item(1, "99999", 1, 5), item(2, "10001", 2, 5)];
        let ranked = rank(items, &directory(), None, SortOrder::Newest);
        assert_eq!(ids(&ranked), vec![1, 2]);
    }

    #[test]
    fn test_price_sorts_break_ties_by_newest_then_id() {
        let items = vec![
            item(1, "05401", 5, 10),
            item(2, "05401", 1, 3),
            item(3, "05401", 2, 10),
            item(4, "05401", 2, 10),
        ];
        let asc = rank(items.clone(), &directory(), None, SortOrder::PriceAsc);
        assert_eq!(ids(&asc), vec![2, 3, 4, 1]);
        let desc = rank(items, &directory(), None, SortOrder::PriceDesc);
        assert_eq!(ids(&desc), vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_distance_sort_ties_break_by_newest() {
        let items = vec![item(1, "05602", 9, 1), item(2, "05602", 1, 1), item(3, "05401", 5, 1)];
        let ranked = rank(items, &directory(), Some(&origin("05401", 100.0)), SortOrder::Distance);
        assert_eq!(ids(&ranked), vec![3, 2, 1]);
    }

    #[test]
    fn test_sort_order_wire_names() {
        let sort: SortOrder = serde_json::from_value(serde_json::json!("price_desc")).unwrap();
        assert_eq!(sort, SortOrder::PriceDesc);
    }

    #[test]
    fn test_origin_from_query() {
        let geo = GeoConfig::default();
        assert_eq!(Origin::from_query(None, Some(10.0), &geo).unwrap(), None);
        assert_eq!(Origin::from_query(Some(" "), None, &geo).unwrap(), None);

        let origin = Origin::from_query(Some("05401-1234"), None, &geo).unwrap().unwrap();
        assert_eq!(origin, origin_default());
        let capped = Origin::from_query(Some("05401"), Some(10_000.0), &geo).unwrap().unwrap();
        assert_eq!(capped.radius_miles, geo.max_radius_miles);

        assert!(Origin::from_query(Some("abc"), None, &geo).is_err());
        assert!(Origin::from_query(Some("05401"), Some(0.0), &geo).is_err());
        assert!(Origin::from_query(Some("05401"), Some(f64::NAN), &geo).is_err());
    }

    fn origin_default() -> Origin {
        origin("05401", GeoConfig::default().default_radius_miles)
    }

    #[test]
    fn test_default_sort_depends_on_origin() {
        assert_eq!(SortOrder::resolve(None, None), SortOrder::Newest);
        assert_eq!(SortOrder::resolve(None, Some(&origin_default())), SortOrder::Distance);
        assert_eq!(SortOrder::resolve(Some(SortOrder::PriceAsc), None), SortOrder::PriceAsc);
    }
}
