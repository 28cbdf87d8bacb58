//! Role-based access control.
//!
//! Pure functions over already-loaded [`User`] and [`Role`] entities. Names are normalized when
//! entities are built (roles uppercase, permissions lowercase), so the checks here reduce to
//! equality lookups.

use std::collections::BTreeSet;

use crate::{
    error::DomainError,
    models::{Permission, Role, SoftDelete, User},
};

/// Prefix carried by every role label handed to the outside world.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Role every identity holds without an explicit assignment.
pub const BASELINE_ROLE: &str = "MEMBER";

/// Role that unlocks the `/admin` surface.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Uppercases a role name and strips a leading `ROLE_` marker, so `"role_admin"`,
/// `"ROLE_ADMIN"` and `"admin"` all resolve to `"ADMIN"`.
pub fn normalize_role_name(role_name: &str) -> String {
    let upper = role_name.trim().to_uppercase();
    match upper.strip_prefix(ROLE_PREFIX) {
        Some(stripped) => stripped.to_string(),
        None => upper,
    }
}

/// Roles that currently grant anything. Soft-deleted roles are ignored.
fn active_roles(user: &User) -> impl Iterator<Item = &Role> {
    user.roles().filter(|role| !role.is_deleted())
}

/// Every granted role label (`ROLE_<NAME>`), always including the baseline role.
pub fn effective_role_labels(user: &User) -> BTreeSet<String> {
    let mut labels: BTreeSet<String> = active_roles(user)
        .map(|role| format!("{ROLE_PREFIX}{}", role.name()))
        .collect();
    labels.insert(format!("{ROLE_PREFIX}{BASELINE_ROLE}"));
    labels
}

pub fn has_role(user: &User, role_name: &str) -> bool {
    let normalized = normalize_role_name(role_name);
    if normalized == BASELINE_ROLE {
        return true;
    }
    active_roles(user).any(|role| role.name() == normalized)
}

/// True if any assigned role grants the permission.
pub fn has_permission(user: &User, permission_name: &str) -> bool {
    active_roles(user).any(|role| role_has_permission(role, permission_name))
}

pub fn role_has_permission(role: &Role, permission_name: &str) -> bool {
    role.has_permission(permission_name)
}

/// Union of the permission names granted through the user's roles.
pub fn effective_permissions(user: &User) -> BTreeSet<String> {
    active_roles(user)
        .flat_map(|role| role.permissions())
        .map(|permission| permission.name().to_string())
        .collect()
}

pub fn require_role(user: &User, role_name: &str) -> Result<(), DomainError> {
    if has_role(user, role_name) {
        Ok(())
    } else {
        Err(DomainError::Forbidden(format!(
            "Role {ROLE_PREFIX}{} is required.",
            normalize_role_name(role_name)
        )))
    }
}

pub fn require_permission(user: &User, permission_name: &str) -> Result<(), DomainError> {
    if has_permission(user, permission_name) {
        Ok(())
    } else {
        Err(DomainError::Forbidden(format!(
            "Permission '{}' is required.",
            Permission::normalize_name(permission_name)
        )))
    }
}

/// Callers may act on their own record; anyone else needs the admin role.
pub fn require_self_or_admin(user: &User, target_user_id: i64) -> Result<(), DomainError> {
    if user.id == target_user_id {
        return Ok(());
    }
    require_role(user, ADMIN_ROLE)
}
