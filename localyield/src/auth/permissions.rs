//! Authorization checks shared by handlers.
//!
//! Roles gate whole features (listing products, offering care, moderating). Ownership gates
//! individual records. Admins pass every ownership check.

use crate::api::models::users::{CurrentUser, Role};
use crate::errors::Error;
use crate::types::{Operation, Resource, UserId};

pub fn require_admin(user: &CurrentUser) -> Result<(), Error> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            action: Operation::Moderate,
            resource: Resource::Admin,
        })
    }
}

pub fn require_role(user: &CurrentUser, role: Role, action: Operation, resource: Resource) -> Result<(), Error> {
    if user.has_role(role) || user.is_admin() {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions { action, resource })
    }
}

pub fn is_owner_or_admin(user: &CurrentUser, owner_id: UserId) -> bool {
    user.id == owner_id || user.is_admin()
}

pub fn require_owner_or_admin(user: &CurrentUser, owner_id: UserId, action: Operation, resource: Resource) -> Result<(), Error> {
    if is_owner_or_admin(user, owner_id) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions { action, resource })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(roles: &[Role]) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            display_name: None,
            zip: None,
            roles: roles.to_vec(),
        }
    }

    #[test]
    fn test_role_checks() {
        let buyer = user(&[Role::Buyer]);
        let producer = user(&[Role::Buyer, Role::Producer]);
        let admin = user(&[Role::Buyer, Role::Admin]);

        assert!(require_admin(&buyer).is_err());
        assert!(require_admin(&admin).is_ok());
        assert!(require_role(&producer, Role::Producer, Operation::Create, Resource::Products).is_ok());
        assert!(matches!(
            require_role(&buyer, Role::Producer, Operation::Create, Resource::Products),
            Err(Error::InsufficientPermissions { .. })
        ));
        assert!(require_role(&admin, Role::Caregiver, Operation::Update, Resource::CareBookings).is_ok());
    }

    #[test]
    fn test_ownership() {
        let owner = user(&[Role::Producer]);
        let stranger = user(&[Role::Buyer]);
        let admin = user(&[Role::Admin]);
        assert!(require_owner_or_admin(&owner, owner.id, Operation::Update, Resource::Products).is_ok());
        assert!(require_owner_or_admin(&stranger, owner.id, Operation::Update, Resource::Products).is_err());
        assert!(require_owner_or_admin(&admin, owner.id, Operation::Delete, Resource::Products).is_ok());
    }
}
