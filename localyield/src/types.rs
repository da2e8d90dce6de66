//! Common type definitions shared by the API and database layers.
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases so signatures say what they carry:
//!
//! - [`UserId`]: marketplace account
//! - [`ProductId`]: a producer's listing
//! - [`OrderId`]: a per-producer order created at checkout
//! - [`ReviewId`]: a buyer's review of an order
//! - [`BookingId`]: an animal-care booking
//! - [`ConversationId`] / [`MessageId`]: direct messaging
//! - [`ReportId`]: a moderation report
//! - [`CategoryId`]: a producer-proposed custom category
//!
//! # Authorization vocabulary
//!
//! [`Resource`] and [`Operation`] name what a caller tried to do when an authorization check
//! fails; they end up in [`crate::errors::Error::InsufficientPermissions`].

use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type ProductId = Uuid;
pub type OrderId = Uuid;
pub type ReviewId = Uuid;
pub type BookingId = Uuid;
pub type ConversationId = Uuid;
pub type MessageId = Uuid;
pub type ReportId = Uuid;
pub type CategoryId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Moderate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Products,
    Categories,
    Orders,
    Reviews,
    CareBookings,
    Conversations,
    Reports,
    Admin,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Moderate => write!(f, "moderate"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Products => "products",
            Resource::Categories => "categories",
            Resource::Orders => "orders",
            Resource::Reviews => "reviews",
            Resource::CareBookings => "care bookings",
            Resource::Conversations => "conversations",
            Resource::Reports => "reports",
            Resource::Admin => "admin resources",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{} {}", Operation::Moderate, Resource::CareBookings), "moderate care bookings");
    }
}
