use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::RepositoryError,
    models::{
        Email, JobApplication, JobApplicationResponse, JobOffer, NewJobApplication, NewJobOffer,
        NewUser, Permission, Role, User,
    },
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

// The store contracts are split per aggregate so each use case names only what it reads.
// **Send + Sync + async_trait** keep the trait objects shareable across Axum's task boundaries.

/// UserRepository
///
/// Lookups return soft-deleted users too; callers decide what a deleted user means for them.
/// Listings only return live records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    /// Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    /// Persists scalar fields, the deletion state, and the role assignments.
    async fn update_user(&self, user: &User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_role_by_id(&self, id: i64) -> Result<Option<Role>, RepositoryError>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError>;
    /// Live roles among `ids`; unknown or deleted ids are skipped.
    async fn find_roles_by_ids(&self, ids: &[i64]) -> Result<Vec<Role>, RepositoryError>;
    async fn list_roles(&self) -> Result<Vec<Role>, RepositoryError>;
    async fn insert_role(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Role, RepositoryError>;
    /// Persists the description, the deletion state, and the permission set.
    async fn update_role(&self, role: &Role) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, RepositoryError>;
    async fn list_permissions(&self) -> Result<Vec<Permission>, RepositoryError>;
    async fn insert_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Permission, RepositoryError>;
    async fn update_permission(&self, permission: &Permission) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait JobOfferRepository: Send + Sync {
    async fn find_job_offer_by_id(&self, id: i64) -> Result<Option<JobOffer>, RepositoryError>;
    async fn list_job_offers(&self) -> Result<Vec<JobOffer>, RepositoryError>;
    async fn insert_job_offer(&self, offer: NewJobOffer) -> Result<JobOffer, RepositoryError>;
    async fn update_job_offer(&self, offer: &JobOffer) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait JobApplicationRepository: Send + Sync {
    async fn find_application_by_id(
        &self,
        id: i64,
    ) -> Result<Option<JobApplication>, RepositoryError>;
    /// The live application linking the pair, if any.
    async fn find_application_by_user_and_offer(
        &self,
        user_id: i64,
        job_offer_id: i64,
    ) -> Result<Option<JobApplication>, RepositoryError>;
    async fn list_applications(
        &self,
        job_offer_id: Option<i64>,
    ) -> Result<Vec<JobApplicationResponse>, RepositoryError>;
    /// Must enforce (user, job offer) uniqueness among live applications atomically,
    /// reporting a violation as `RepositoryError::Conflict`.
    async fn insert_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, RepositoryError>;
    async fn update_application(&self, application: &JobApplication)
    -> Result<(), RepositoryError>;
}

/// Repository
///
/// The full persistence surface, implemented for anything that provides every store contract.
pub trait Repository:
    UserRepository + RoleRepository + PermissionRepository + JobOfferRepository + JobApplicationRepository
{
}

impl<T> Repository for T where
    T: UserRepository
        + RoleRepository
        + PermissionRepository
        + JobOfferRepository
        + JobApplicationRepository
{
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;
