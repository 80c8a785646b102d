//! Role-based access checks.
//!
//! Each check takes an already-authenticated user and hands it back when the
//! policy is satisfied. Failure is always [`Forbidden`].

use crate::auth::models::{Role, User};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient permissions")]
pub struct Forbidden;

/// Confirmed administrators only.
pub fn require_admin(user: User) -> Result<User, Forbidden> {
    if user.role == Role::Admin && user.confirmed {
        return Ok(user);
    }
    deny(user, "admin")
}

/// Any confirmed account, whatever its role.
pub fn require_any_role(user: User) -> Result<User, Forbidden> {
    if matches!(user.role, Role::User | Role::Manager | Role::Admin) && user.confirmed {
        return Ok(user);
    }
    deny(user, "any_role")
}

/// Managers and administrators.
///
/// Unlike the other checks this one does not look at `confirmed`.
pub fn require_manager_or_admin(user: User) -> Result<User, Forbidden> {
    if matches!(user.role, Role::Manager | Role::Admin) {
        return Ok(user);
    }
    deny(user, "manager_or_admin")
}

fn deny(user: User, policy: &'static str) -> Result<User, Forbidden> {
    debug!(
        username = %user.username,
        role = user.role.as_str(),
        confirmed = user.confirmed,
        policy,
        "Access denied"
    );
    Err(Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(role: Role, confirmed: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: "policy@example.com".to_string(),
            password_hash: "hash".to_string(),
            role,
            confirmed,
            otp: None,
            image: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_require_admin() {
        assert_eq!(require_admin(user(Role::Manager, true)), Err(Forbidden));
        assert!(require_admin(user(Role::Admin, true)).is_ok());
        assert_eq!(require_admin(user(Role::Admin, false)), Err(Forbidden));
        assert_eq!(require_admin(user(Role::User, true)), Err(Forbidden));
    }

    #[test]
    fn test_require_any_role_needs_confirmation() {
        for role in [Role::User, Role::Manager, Role::Admin] {
            assert!(require_any_role(user(role, true)).is_ok());
            assert_eq!(require_any_role(user(role, false)), Err(Forbidden));
        }
    }

    #[test]
    fn test_require_manager_or_admin_ignores_confirmation() {
        assert!(require_manager_or_admin(user(Role::Manager, true)).is_ok());
        assert!(require_manager_or_admin(user(Role::Admin, true)).is_ok());
        assert!(require_manager_or_admin(user(Role::Manager, false)).is_ok());
        assert!(require_manager_or_admin(user(Role::Admin, false)).is_ok());
        assert_eq!(require_manager_or_admin(user(Role::User, true)), Err(Forbidden));
    }

    #[test]
    fn test_passing_check_returns_user_unchanged() {
        let original = user(Role::Admin, true);
        let passed = require_admin(original.clone()).unwrap();
        assert_eq!(passed, original);
    }
}
