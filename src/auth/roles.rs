// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account roles derived from the user flags.

use serde::{Deserialize, Serialize};

use crate::storage::User;

/// Account roles.
///
/// ## Role Hierarchy
///
/// - `Superuser` - every privilege (`is_superuser`)
/// - `Staff` - back-office access plus member privileges (`is_staff`)
/// - `Member` - a regular invoicing account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superuser,
    Staff,
    Member,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Superuser, _) => true,
            (Role::Staff, Role::Staff | Role::Member) => true,
            (Role::Member, Role::Member) => true,
            _ => false,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Member
    }
}

impl From<&User> for Role {
    fn from(user: &User) -> Self {
        if user.is_superuser {
            Role::Superuser
        } else if user.is_staff {
            Role::Staff
        } else {
            Role::Member
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Superuser => write!(f, "superuser"),
            Role::Staff => write!(f, "staff"),
            Role::Member => write!(f, "member"),
        }
    }
}
