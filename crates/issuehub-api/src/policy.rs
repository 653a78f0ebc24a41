//! Authorization policy. Every mutating handler goes through these checks
//! before touching the store.

use uuid::Uuid;

use issuehub_types::Role;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Principal;

/// Admins satisfy every role requirement; others must match exactly.
pub fn require_role(principal: &Principal, required: Role) -> ApiResult<()> {
    if principal.role.satisfies(required) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("{} role required", required)))
    }
}

/// The principal must own the resource, unless they are an admin.
pub fn require_owner(principal: &Principal, owner_id: Uuid) -> ApiResult<()> {
    if principal.role == Role::Admin || principal.id == owner_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("you do not own this issue"))
    }
}

/// Staff may only work issues assigned to them; admins may work any.
pub fn require_assignee(principal: &Principal, assignee: Option<Uuid>) -> ApiResult<()> {
    require_role(principal, Role::Staff)?;
    if principal.role == Role::Admin || assignee == Some(principal.id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("issue is not assigned to you"))
    }
}

#[cfg(test)]
mod tests {
    use issuehub_types::Subscription;

    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            name: "Test".into(),
            email: "test@example.com".into(),
            role,
            subscription: Subscription::Free,
            avatar_url: None,
        }
    }

    #[test]
    fn role_requirements() {
        assert!(require_role(&principal(Role::Admin), Role::Staff).is_ok());
        assert!(require_role(&principal(Role::Admin), Role::Citizen).is_ok());
        assert!(require_role(&principal(Role::Staff), Role::Staff).is_ok());
        assert!(matches!(
            require_role(&principal(Role::Citizen), Role::Admin),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            require_role(&principal(Role::Staff), Role::Citizen),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn ownership() {
        let citizen = principal(Role::Citizen);
        assert!(require_owner(&citizen, citizen.id).is_ok());
        assert!(require_owner(&citizen, Uuid::new_v4()).is_err());
        assert!(require_owner(&principal(Role::Admin), Uuid::new_v4()).is_ok());
        // Staff get no ownership bypass
        assert!(require_owner(&principal(Role::Staff), Uuid::new_v4()).is_err());
    }

    #[test]
    fn assignment() {
        let staff = principal(Role::Staff);
        assert!(require_assignee(&staff, Some(staff.id)).is_ok());
        assert!(require_assignee(&staff, Some(Uuid::new_v4())).is_err());
        assert!(require_assignee(&staff, None).is_err());
        assert!(require_assignee(&principal(Role::Admin), None).is_ok());
        let citizen = principal(Role::Citizen);
        assert!(require_assignee(&citizen, Some(citizen.id)).is_err());
    }
}
