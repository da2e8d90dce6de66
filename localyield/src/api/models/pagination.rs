//! Page-numbered pagination for list endpoints.
//!
//! Pages are 1-based. `page_size` defaults to 20 and is clamped to `1..=50`, so a client can never
//! ask for an empty or oversized page.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Default number of items to return per page.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum number of items that can be requested per page.
pub const MAX_PAGE_SIZE: i64 = 50;

#[serde_as]
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct PageQuery {
    /// 1-based page number (default: 1)
    #[param(default = 1, minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page: Option<i64>,

    /// Items per page (default: 20, max: 50)
    #[param(default = 20, minimum = 1, maximum = 50)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page_size: Option<i64>,
}

impl PageQuery {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    #[inline]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    #[inline]
    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// Rows to skip before this page starts.
    #[inline]
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }

    /// Cut this page out of an already-ordered, fully materialized list.
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as i64;
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let items = items.into_iter().skip(offset).take(self.page_size() as usize).collect();
        Page::new(items, total, self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching items across all pages
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, query: &PageQuery) -> Self {
        Self {
            items,
            total,
            page: query.page(),
            page_size: query.page_size(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let q = PageQuery::default();
        assert_eq!(q.page(), 1);
        assert_eq!(q.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(PageQuery::new(0, 0).page(), 1);
        assert_eq!(PageQuery::new(-3, 5).page(), 1);
        assert_eq!(PageQuery::new(1, 0).page_size(), 1);
        assert_eq!(PageQuery::new(1, 500).page_size(), MAX_PAGE_SIZE);
        assert_eq!(PageQuery::new(3, 10).offset(), 20);
    }

    #[test]
    fn test_query_string_parsing() {
        let q: PageQuery = serde_json::from_value(serde_json::json!({"page": "2", "page_size": "5"})).unwrap();
        assert_eq!((q.page(), q.page_size()), (2, 5));
    }

    #[test]
    fn test_slice() {
        let page = PageQuery::new(2, 3).slice((1..=8).collect::<Vec<_>>());
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 8);

        let beyond = PageQuery::new(9, 3).slice((1..=8).collect::<Vec<_>>());
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 8);
    }
}
