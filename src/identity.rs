//! Identity use cases: accounts, roles and permissions.

use axum::extract::FromRef;

use crate::{
    AppState,
    error::{DomainError, RepositoryError},
    models::{Email, NewUser, Permission, Role, SoftDelete, UpdateUserRequest, User},
    password::HasherState,
    rbac,
    repository::RepositoryState,
};

/// CreateUserCommand
///
/// Raw account data as received from an admin request or the CLI.
#[derive(Debug, Clone)]
pub struct CreateUserCommand {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role_ids: Vec<i64>,
}

/// IdentityService
///
/// Mutations of users, roles and permissions. Each operation loads the entity, applies the
/// change on the domain type, then writes it back through the matching `update_*` call.
#[derive(Clone)]
pub struct IdentityService {
    repo: RepositoryState,
    hasher: HasherState,
}

impl FromRef<AppState> for IdentityService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.repo.clone(), state.hasher.clone())
    }
}

fn require_non_blank(value: &str, field: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be blank.")));
    }
    Ok(())
}

impl IdentityService {
    pub fn new(repo: RepositoryState, hasher: HasherState) -> Self {
        Self { repo, hasher }
    }

    // --- Users ---

    pub async fn create_user(&self, command: CreateUserCommand) -> Result<User, DomainError> {
        let email = Email::parse(&command.email)?;
        require_non_blank(&command.name, "Name")?;
        require_non_blank(&command.password, "Password")?;

        if self.repo.find_user_by_email(&email).await?.is_some() {
            return Err(DomainError::AlreadyExists(format!(
                "User with email {email} already exists."
            )));
        }

        let password_hash = self.hasher.hash(&command.password)?;

        // Unknown or deleted role ids are dropped rather than rejected.
        let role_ids = self
            .repo
            .find_roles_by_ids(&command.role_ids)
            .await?
            .iter()
            .map(|role| role.id)
            .collect();

        let user = self
            .repo
            .insert_user(NewUser {
                email: email.clone(),
                name: command.name.trim().to_string(),
                password_hash,
                role_ids,
            })
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => DomainError::AlreadyExists(format!(
                    "User with email {email} already exists."
                )),
                other => DomainError::Storage(other),
            })?;

        tracing::info!(user_id = user.id, email = %user.email(), "user created");
        Ok(user)
    }

    /// Verifies login credentials. Unknown, deleted and mismatching accounts are
    /// indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, DomainError> {
        let Ok(email) = Email::parse(email) else {
            return Err(DomainError::Unauthorized);
        };

        match self.repo.find_user_by_email(&email).await? {
            Some(user) if !user.is_deleted() && self.hasher.verify(password, &user.password_hash) => {
                Ok(user)
            }
            _ => {
                tracing::debug!(email = %email, "login rejected");
                Err(DomainError::Unauthorized)
            }
        }
    }

    pub async fn find_active_user(&self, user_id: i64) -> Result<User, DomainError> {
        match self.repo.find_user_by_id(user_id).await? {
            Some(user) if !user.is_deleted() => Ok(user),
            _ => Err(DomainError::NotFound(format!(
                "User with ID {user_id} not found."
            ))),
        }
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        changes: UpdateUserRequest,
    ) -> Result<User, DomainError> {
        let mut user = self.find_active_user(user_id).await?;

        if let Some(name) = changes.name {
            require_non_blank(&name, "Name")?;
            user.name = name.trim().to_string();
        }
        if let Some(password) = changes.password {
            require_non_blank(&password, "Password")?;
            user.password_hash = self.hasher.hash(&password)?;
        }

        self.repo.update_user(&user).await?;
        self.find_active_user(user_id).await
    }

    /// Assigning a role the user already holds is a no-op.
    pub async fn assign_role(&self, user_id: i64, role_name: &str) -> Result<User, DomainError> {
        let mut user = self.find_active_user(user_id).await?;
        let role = self.find_active_role(role_name).await?;

        if user.add_role(role) {
            self.repo.update_user(&user).await?;
            tracing::info!(user_id, role = %rbac::normalize_role_name(role_name), "role assigned");
        }
        self.find_active_user(user_id).await
    }

    /// Revoking a role the user does not hold is a no-op.
    pub async fn revoke_role(&self, user_id: i64, role_name: &str) -> Result<User, DomainError> {
        let mut user = self.find_active_user(user_id).await?;

        if user.remove_role(role_name) {
            self.repo.update_user(&user).await?;
            tracing::info!(user_id, role = %rbac::normalize_role_name(role_name), "role revoked");
        }
        self.find_active_user(user_id).await
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<(), DomainError> {
        let mut user = self.find_active_user(user_id).await?;
        user.soft_delete();
        self.repo.update_user(&user).await?;
        tracing::info!(user_id, "user soft-deleted");
        Ok(())
    }

    /// Answers whether the user currently holds the permission through any live role.
    pub async fn user_has_permission(
        &self,
        user_id: i64,
        permission_name: &str,
    ) -> Result<bool, DomainError> {
        let user = self.find_active_user(user_id).await?;
        Ok(rbac::has_permission(&user, permission_name))
    }

    // --- Roles ---

    pub async fn find_active_role(&self, role_name: &str) -> Result<Role, DomainError> {
        let name = rbac::normalize_role_name(role_name);
        match self.repo.find_role_by_name(&name).await? {
            Some(role) if !role.is_deleted() => Ok(role),
            _ => Err(DomainError::NotFound(format!("Role {name} not found."))),
        }
    }

    /// Creates a role. A `ROLE_` prefix on the requested name is dropped, since it is only
    /// ever added back when labels are rendered.
    pub async fn create_role(
        &self,
        role_name: &str,
        description: Option<String>,
    ) -> Result<Role, DomainError> {
        let name = rbac::normalize_role_name(role_name);
        require_non_blank(&name, "Role name")?;

        if self.repo.find_role_by_name(&name).await?.is_some() {
            return Err(DomainError::AlreadyExists(format!(
                "Role {name} already exists."
            )));
        }

        let role = self
            .repo
            .insert_role(&name, description)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => {
                    DomainError::AlreadyExists(format!("Role {name} already exists."))
                }
                other => DomainError::Storage(other),
            })?;

        tracing::info!(role_id = role.id, role = %role.name(), "role created");
        Ok(role)
    }

    pub async fn delete_role(&self, role_name: &str) -> Result<(), DomainError> {
        let mut role = self.find_active_role(role_name).await?;
        role.soft_delete();
        self.repo.update_role(&role).await?;
        tracing::info!(role_id = role.id, role = %role.name(), "role soft-deleted");
        Ok(())
    }

    /// Granting a permission the role already holds is a no-op.
    pub async fn grant_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> Result<Role, DomainError> {
        let mut role = self.find_active_role(role_name).await?;
        let permission = self.find_permission(permission_name).await?;

        if role.add_permission(permission) {
            self.repo.update_role(&role).await?;
            tracing::info!(role = %role.name(), permission = %Permission::normalize_name(permission_name), "permission granted");
        }
        Ok(role)
    }

    pub async fn revoke_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> Result<Role, DomainError> {
        let mut role = self.find_active_role(role_name).await?;

        if role.remove_permission(permission_name) {
            self.repo.update_role(&role).await?;
            tracing::info!(role = %role.name(), permission = %Permission::normalize_name(permission_name), "permission revoked");
        }
        Ok(role)
    }

    // --- Permissions ---

    pub async fn find_permission(&self, permission_name: &str) -> Result<Permission, DomainError> {
        self.repo
            .find_permission_by_name(permission_name)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!(
                    "Permission {} not found.",
                    Permission::normalize_name(permission_name)
                ))
            })
    }

    pub async fn create_permission(
        &self,
        permission_name: &str,
        description: Option<String>,
    ) -> Result<Permission, DomainError> {
        let name = Permission::normalize_name(permission_name);
        require_non_blank(&name, "Permission name")?;

        if self.repo.find_permission_by_name(&name).await?.is_some() {
            return Err(DomainError::AlreadyExists(format!(
                "Permission {name} already exists."
            )));
        }

        let permission = self
            .repo
            .insert_permission(&name, description)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict(_) => {
                    DomainError::AlreadyExists(format!("Permission {name} already exists."))
                }
                other => DomainError::Storage(other),
            })?;

        tracing::info!(permission = %permission.name(), "permission created");
        Ok(permission)
    }
}
