//! Product categories: a fixed built-in set plus producer-proposed custom ones.

use super::validation;
use crate::db::models::categories::CustomCategoryDBResponse;
use crate::errors::Error;
use crate::types::{CategoryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// `(slug, display name)` of the categories every listing may use.
pub const BUILTIN_CATEGORIES: &[(&str, &str)] = &[
    ("produce", "Produce"),
    ("eggs", "Eggs"),
    ("dairy", "Dairy"),
    ("meat", "Meat"),
    ("baked-goods", "Baked goods"),
    ("preserves", "Preserves"),
    ("honey", "Honey"),
    ("flowers", "Flowers"),
    ("plants", "Plants"),
    ("crafts", "Crafts"),
    ("livestock", "Livestock"),
    ("feed", "Feed"),
];

pub fn is_builtin(slug: &str) -> bool {
    BUILTIN_CATEGORIES.iter().any(|(builtin, _)| *builtin == slug)
}

/// Lower-case ASCII letters and digits joined by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "category_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CategoryProposal {
    pub name: String,
}

impl CategoryProposal {
    /// Returns `(slug, name)`.
    pub fn validate(&self) -> Result<(String, String), Error> {
        let name = validation::text("name", &self.name, 2, 40)?;
        let slug = slugify(&name);
        if slug.len() < 2 {
            return Err(validation::invalid("name", "must contain at least two letters or digits"));
        }
        if is_builtin(&slug) {
            return Err(Error::Conflict {
                message: format!("'{name}' is already a built-in category"),
            });
        }
        Ok((slug, name))
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CategoryDecision {
    pub status: CategoryStatus,
}

impl CategoryDecision {
    pub fn validate(&self) -> Result<CategoryStatus, Error> {
        match self.status {
            CategoryStatus::Pending => Err(validation::invalid("status", "must be approved or rejected")),
            status => Ok(status),
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
pub struct ListCustomCategoriesQuery {
    pub status: Option<CategoryStatus>,
}

/// A category a listing can be filed under.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryResponse {
    pub slug: String,
    pub name: String,
    pub builtin: bool,
}

impl CategoryResponse {
    pub fn builtins() -> Vec<CategoryResponse> {
        BUILTIN_CATEGORIES
            .iter()
            .map(|(slug, name)| CategoryResponse {
                slug: slug.to_string(),
                name: name.to_string(),
                builtin: true,
            })
            .collect()
    }
}

impl From<CustomCategoryDBResponse> for CategoryResponse {
    fn from(db: CustomCategoryDBResponse) -> Self {
        Self {
            slug: db.slug,
            name: db.name,
            builtin: false,
        }
    }
}

/// A proposal as seen by its author and by admins.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomCategoryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CategoryId,
    pub slug: String,
    pub name: String,
    pub status: CategoryStatus,
    #[schema(value_type = String, format = "uuid")]
    pub proposed_by: UserId,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl From<CustomCategoryDBResponse> for CustomCategoryResponse {
    fn from(db: CustomCategoryDBResponse) -> Self {
        Self {
            id: db.id,
            slug: db.slug,
            name: db.name,
            status: db.status,
            proposed_by: db.proposed_by,
            created_at: db.created_at,
            decided_at: db.decided_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Maple Syrup"), "maple-syrup");
        assert_eq!(slugify("  Soap & Candles!! "), "soap-candles");
        assert_eq!(slugify("Goat's milk -- raw"), "goat-s-milk-raw");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_proposal_rejects_builtins_and_noise() {
        assert!(matches!(
            CategoryProposal { name: "Baked Goods".into() }.validate(),
            Err(Error::Conflict { .. })
        ));
        assert!(CategoryProposal { name: "!!".into() }.validate().is_err());
        assert_eq!(
            CategoryProposal { name: " Maple syrup ".into() }.validate().unwrap(),
            ("maple-syrup".to_string(), "Maple syrup".to_string())
        );
    }

    #[test]
    fn test_decision_cannot_reset_to_pending() {
        assert!(CategoryDecision { status: CategoryStatus::Pending }.validate().is_err());
        assert_eq!(
            CategoryDecision { status: CategoryStatus::Approved }.validate().unwrap(),
            CategoryStatus::Approved
        );
    }

    #[test]
    fn test_builtins_are_slugs() {
        for (slug, name) in BUILTIN_CATEGORIES {
            assert_eq!(&slugify(name), slug);
        }
    }
}
