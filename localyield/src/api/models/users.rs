//! API request/response models for users, roles and caregiver profiles.

use super::validation;
use crate::db::models::users::{CaregiverListingDBResponse, CaregiverProfileDBResponse, UserDBResponse};
use crate::errors::Error;
use crate::search::Searchable;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Marketplace roles. Every account is a buyer; the others are granted on top.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Producer,
    Caregiver,
    Admin,
}

/// The authenticated caller, resolved by the auth extractors.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub zip: Option<String>,
    pub roles: Vec<Role>,
}

impl CurrentUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            display_name: db.display_name,
            zip: db.zip,
            roles: db.roles,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub zip: Option<String>,
    pub bio: Option<String>,
    /// Grants the producer role; cannot be revoked here
    #[serde(default)]
    pub become_producer: bool,
}

/// Validated form of [`ProfileUpdate`]: `Some(None)` clears a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidProfileUpdate {
    pub display_name: Option<Option<String>>,
    pub zip: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub become_producer: bool,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<ValidProfileUpdate, Error> {
        let display_name = match &self.display_name {
            Some(name) => Some(validation::optional_text("display_name", Some(name), 80)?),
            None => None,
        };
        let zip = match self.zip.as_deref().map(str::trim) {
            Some("") => Some(None),
            Some(zip) => Some(Some(validation::zip("zip", zip)?)),
            None => None,
        };
        let bio = match &self.bio {
            Some(bio) => Some(validation::optional_text("bio", Some(bio), 2000)?),
            None => None,
        };
        Ok(ValidProfileUpdate {
            display_name,
            zip,
            bio,
            become_producer: self.become_producer,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CaregiverProfileUpdate {
    #[serde(default)]
    pub bio: String,
    pub services: Vec<String>,
    #[schema(value_type = String, example = "45.00")]
    pub rate_per_day: Decimal,
    pub zip: String,
}

pub const MAX_SERVICES: usize = 20;

impl CaregiverProfileUpdate {
    /// Services are lower-cased, trimmed and de-duplicated in first-seen order.
    pub fn validate(&self) -> Result<CaregiverProfileUpdate, Error> {
        let mut services: Vec<String> = Vec::new();
        for service in &self.services {
            let service = validation::text("services", service, 1, 40)?.to_lowercase();
            if !services.contains(&service) {
                services.push(service);
            }
        }
        if services.is_empty() {
            return Err(validation::invalid("services", "list at least one service"));
        }
        if services.len() > MAX_SERVICES {
            return Err(validation::invalid("services", format!("at most {MAX_SERVICES} services")));
        }
        Ok(CaregiverProfileUpdate {
            bio: validation::optional_text("bio", Some(&self.bio), 2000)?.unwrap_or_default(),
            services,
            rate_per_day: validation::money("rate_per_day", self.rate_per_day)?,
            zip: validation::zip("zip", &self.zip)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CaregiverProfileResponse {
    pub bio: String,
    pub services: Vec<String>,
    #[schema(value_type = String)]
    pub rate_per_day: Decimal,
    pub zip: String,
    pub updated_at: DateTime<Utc>,
}

impl From<CaregiverProfileDBResponse> for CaregiverProfileResponse {
    fn from(db: CaregiverProfileDBResponse) -> Self {
        Self {
            bio: db.bio,
            services: db.services,
            rate_per_day: db.rate_per_day,
            zip: db.zip,
            updated_at: db.updated_at,
        }
    }
}

/// The caller's own account, as returned by `GET /api/me`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub zip: Option<String>,
    pub bio: Option<String>,
    pub roles: Vec<Role>,
    pub is_suspended: bool,
    pub auth_source: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caregiver_profile: Option<CaregiverProfileResponse>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            display_name: db.display_name,
            zip: db.zip,
            bio: db.bio,
            roles: db.roles,
            is_suspended: db.is_suspended,
            auth_source: db.auth_source,
            created_at: db.created_at,
            caregiver_profile: None,
        }
    }
}

impl UserResponse {
    pub fn with_caregiver_profile(mut self, profile: Option<CaregiverProfileDBResponse>) -> Self {
        self.caregiver_profile = profile.map(Into::into);
        self
    }
}

/// What anyone can see about an account. Email is never included.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicProfile {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub zip: Option<String>,
    pub roles: Vec<Role>,
    pub member_since: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caregiver_profile: Option<CaregiverProfileResponse>,
}

impl From<UserDBResponse> for PublicProfile {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            display_name: db.display_name,
            bio: db.bio,
            zip: db.zip,
            roles: db.roles.into_iter().filter(|role| *role != Role::Admin).collect(),
            member_since: db.created_at,
            caregiver_profile: None,
        }
    }
}

impl PublicProfile {
    pub fn with_caregiver_profile(mut self, profile: Option<CaregiverProfileDBResponse>) -> Self {
        self.caregiver_profile = profile.map(Into::into);
        self
    }
}

/// Query parameters for `GET /api/caregivers`
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct CaregiverQuery {
    pub zip: Option<String>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub radius: Option<f64>,
    /// Only caregivers offering this service
    pub service: Option<String>,
    #[serde(flatten)]
    #[param(inline)]
    pub page: super::pagination::PageQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CaregiverListingResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub bio: String,
    pub services: Vec<String>,
    #[schema(value_type = String)]
    pub rate_per_day: Decimal,
    pub zip: String,
    pub distance_miles: Option<f64>,
}

impl CaregiverListingResponse {
    pub fn new(listing: CaregiverListingDBResponse, distance_miles: Option<f64>) -> Self {
        Self {
            user_id: listing.user_id,
            display_name: listing.display_name,
            bio: listing.bio,
            services: listing.services,
            rate_per_day: listing.rate_per_day,
            zip: listing.zip,
            distance_miles,
        }
    }
}

impl Searchable for CaregiverListingDBResponse {
    fn id(&self) -> uuid::Uuid {
        self.user_id
    }
    fn zip(&self) -> &str {
        &self.zip
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn price(&self) -> Decimal {
        self.rate_per_day
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn db_user(roles: Vec<Role>) -> UserDBResponse {
        UserDBResponse {
            id: uuid::Uuid::new_v4(),
            external_id: None,
            email: "hen@example.com".to_string(),
            display_name: Some("Hen House".to_string()),
            zip: Some("05401".to_string()),
            bio: None,
            auth_source: "dev-stub".to_string(),
            is_suspended: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            roles,
        }
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_value(Role::Caregiver).unwrap(), "caregiver");
        let role: Role = serde_json::from_value(serde_json::json!("producer")).unwrap();
        assert_eq!(role, Role::Producer);
    }

    #[test]
    fn test_public_profile_hides_admin_and_email() {
        let profile = PublicProfile::from(db_user(vec![Role::Buyer, Role::Admin]));
        assert_eq!(profile.roles, vec![Role::Buyer]);
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("email").is_none());
    }

    #[test]
    fn test_profile_update_validation() {
        let update = ProfileUpdate {
            display_name: Some("  ".to_string()),
            zip: Some("05401-9999".to_string()),
            bio: None,
            become_producer: true,
        }
        .validate()
        .unwrap();
        assert_eq!(update.display_name, Some(None));
        assert_eq!(update.zip, Some(Some("05401".to_string())));
        assert_eq!(update.bio, None);

        let bad = ProfileUpdate {
            zip: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_caregiver_profile_normalizes_services() {
        let profile = CaregiverProfileUpdate {
            bio: "Goats and chickens".to_string(),
            services: vec![" Goat Milking ".to_string(), "goat milking".to_string(), "Feeding".to_string()],
            rate_per_day: Decimal::from_str("45").unwrap(),
            zip: "05602".to_string(),
        }
        .validate()
        .unwrap();
        assert_eq!(profile.services, vec!["goat milking", "feeding"]);

        let empty = CaregiverProfileUpdate {
            services: vec![],
            ..profile
        };
        assert!(empty.validate().is_err());
    }
}
