// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for network-join authorization.

use serde::{Deserialize, Serialize};

/// Control-plane user roles.
///
/// ## Role Hierarchy
///
/// - `Admin` - May join hosts to any network
/// - `User` - May join hosts only to networks granted explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Regular user (least privilege)
    #[default]
    User,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::User, Role::User) => true,
            _ => false,
        }
    }

    /// Whether this role bypasses per-network grants.
    pub fn joins_any_network(&self) -> bool {
        self.has_privilege(Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_all_privileges() {
        assert!(Role::Admin.has_privilege(Role::Admin));
        assert!(Role::Admin.has_privilege(Role::User));
        assert!(Role::Admin.joins_any_network());
    }

    #[test]
    fn user_only_has_user_privilege() {
        assert!(!Role::User.has_privilege(Role::Admin));
        assert!(Role::User.has_privilege(Role::User));
        assert!(!Role::User.joins_any_network());
    }

    #[test]
    fn deserializes_lowercase_names() {
        let roles: Vec<Role> = serde_json::from_str(r#"["admin", "user"]"#).unwrap();
        assert_eq!(roles, vec![Role::Admin, Role::User]);
        assert!(serde_json::from_str::<Role>(r#""auditor""#).is_err());
    }

    #[test]
    fn default_role_is_user() {
        assert_eq!(Role::default(), Role::User);
    }
}
