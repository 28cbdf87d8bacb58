use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    JobApplicationRepository, JobOfferRepository, PermissionRepository, RoleRepository,
    UserRepository,
};
use crate::{
    error::RepositoryError,
    models::{
        DeletionState, Email, JobApplication, JobApplicationResponse, JobOffer, NewJobApplication,
        NewJobOffer, NewUser, Permission, Role, SoftDelete, User,
    },
};

// Records are stored flat, with relations as id sets, and hydrated on read. This mirrors the
// join tables of the SQL schema so both stores observe the same semantics.

#[derive(Debug, Clone)]
struct StoredUser {
    id: i64,
    email: Email,
    name: String,
    password_hash: String,
    role_ids: BTreeSet<i64>,
    deletion: DeletionState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredRole {
    id: i64,
    name: String,
    description: Option<String>,
    permission_ids: BTreeSet<i64>,
    deletion: DeletionState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Sequence(i64);

impl Sequence {
    fn next(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i64, StoredUser>,
    roles: BTreeMap<i64, StoredRole>,
    permissions: BTreeMap<i64, Permission>,
    job_offers: BTreeMap<i64, JobOffer>,
    applications: BTreeMap<i64, JobApplication>,
    user_seq: Sequence,
    role_seq: Sequence,
    permission_seq: Sequence,
    job_offer_seq: Sequence,
    application_seq: Sequence,
}

impl Tables {
    fn role(&self, stored: &StoredRole) -> Role {
        let mut role = Role::new(stored.id, &stored.name, stored.description.clone());
        role.deletion = stored.deletion;
        role.created_at = stored.created_at;
        role.updated_at = stored.updated_at;
        for permission_id in &stored.permission_ids {
            if let Some(permission) = self.permissions.get(permission_id) {
                role.add_permission(permission.clone());
            }
        }
        role
    }

    fn user(&self, stored: &StoredUser) -> User {
        let mut user = User::new(
            stored.id,
            stored.email.clone(),
            &stored.name,
            &stored.password_hash,
        );
        user.deletion = stored.deletion;
        user.created_at = stored.created_at;
        user.updated_at = stored.updated_at;
        // Soft-deleted roles stay attached so a later restore brings them back.
        for role_id in &stored.role_ids {
            if let Some(role) = self.roles.get(role_id) {
                user.add_role(self.role(role));
            }
        }
        user
    }

    fn job_offer(&self, offer: &JobOffer) -> JobOffer {
        let mut offer = offer.clone();
        offer.application_count = self
            .applications
            .values()
            .filter(|application| {
                application.job_offer_id == offer.id && !application.is_deleted()
            })
            .count() as i64;
        offer
    }

    fn live_application(&self, user_id: i64, job_offer_id: i64) -> Option<&JobApplication> {
        self.applications.values().find(|application| {
            application.user_id == user_id
                && application.job_offer_id == job_offer_id
                && !application.is_deleted()
        })
    }
}

/// InMemoryRepository
///
/// Mutex-guarded store for tests and local experiments. Every uniqueness rule is checked
/// under the same lock as the write, so concurrent inserts behave like the SQL constraints.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    application_writes: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of application inserts and updates that reached the store.
    pub fn application_write_count(&self) -> usize {
        self.application_writes.load(Ordering::SeqCst)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic in another test thread must not wedge the store.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables();
        Ok(tables.users.get(&id).map(|stored| tables.user(stored)))
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .users
            .values()
            .find(|stored| &stored.email == email)
            .map(|stored| tables.user(stored)))
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .users
            .values()
            .filter(|stored| !stored.deletion.is_deleted())
            .map(|stored| tables.user(stored))
            .collect())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables();
        if tables.users.values().any(|stored| stored.email == user.email) {
            return Err(RepositoryError::Conflict("users_email_key".to_string()));
        }

        let role_ids = user
            .role_ids
            .iter()
            .copied()
            .filter(|role_id| tables.roles.contains_key(role_id))
            .collect();
        let now = Utc::now();
        let id = tables.user_seq.next();
        let stored = StoredUser {
            id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role_ids,
            deletion: DeletionState::Active,
            created_at: now,
            updated_at: now,
        };
        let hydrated = tables.user(&stored);
        tables.users.insert(id, stored);
        Ok(hydrated)
    }

    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        let email_taken = tables
            .users
            .values()
            .any(|stored| stored.id != user.id && &stored.email == user.email());
        if email_taken {
            return Err(RepositoryError::Conflict("users_email_key".to_string()));
        }

        let stored = tables
            .users
            .get_mut(&user.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.email = user.email().clone();
        stored.name = user.name.clone();
        stored.password_hash = user.password_hash.clone();
        stored.role_ids = user.role_ids().into_iter().collect();
        stored.deletion = user.deletion;
        stored.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for InMemoryRepository {
    async fn find_role_by_id(&self, id: i64) -> Result<Option<Role>, RepositoryError> {
        let tables = self.tables();
        Ok(tables.roles.get(&id).map(|stored| tables.role(stored)))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError> {
        let name = Role::normalize_name(name);
        let tables = self.tables();
        Ok(tables
            .roles
            .values()
            .find(|stored| stored.name == name)
            .map(|stored| tables.role(stored)))
    }

    async fn find_roles_by_ids(&self, ids: &[i64]) -> Result<Vec<Role>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .roles
            .values()
            .filter(|stored| ids.contains(&stored.id) && !stored.deletion.is_deleted())
            .map(|stored| tables.role(stored))
            .collect())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, RepositoryError> {
        let tables = self.tables();
        let mut roles: Vec<Role> = tables
            .roles
            .values()
            .filter(|stored| !stored.deletion.is_deleted())
            .map(|stored| tables.role(stored))
            .collect();
        roles.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(roles)
    }

    async fn insert_role(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Role, RepositoryError> {
        let name = Role::normalize_name(name);
        let mut tables = self.tables();
        if tables.roles.values().any(|stored| stored.name == name) {
            return Err(RepositoryError::Conflict("roles_name_key".to_string()));
        }

        let now = Utc::now();
        let id = tables.role_seq.next();
        let stored = StoredRole {
            id,
            name,
            description,
            permission_ids: BTreeSet::new(),
            deletion: DeletionState::Active,
            created_at: now,
            updated_at: now,
        };
        let hydrated = tables.role(&stored);
        tables.roles.insert(id, stored);
        Ok(hydrated)
    }

    async fn update_role(&self, role: &Role) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        let stored = tables
            .roles
            .get_mut(&role.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.description = role.description.clone();
        stored.permission_ids = role.permissions().map(|permission| permission.id).collect();
        stored.deletion = role.deletion;
        stored.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PermissionRepository for InMemoryRepository {
    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, RepositoryError> {
        let name = Permission::normalize_name(name);
        Ok(self
            .tables()
            .permissions
            .values()
            .find(|permission| permission.name() == name)
            .cloned())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, RepositoryError> {
        let mut permissions: Vec<Permission> =
            self.tables().permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(permissions)
    }

    async fn insert_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Permission, RepositoryError> {
        let name = Permission::normalize_name(name);
        let mut tables = self.tables();
        if tables
            .permissions
            .values()
            .any(|permission| permission.name() == name)
        {
            return Err(RepositoryError::Conflict("permissions_name_key".to_string()));
        }

        let id = tables.permission_seq.next();
        let permission = Permission::new(id, &name, description);
        tables.permissions.insert(id, permission.clone());
        Ok(permission)
    }

    async fn update_permission(&self, permission: &Permission) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        let stored = tables
            .permissions
            .get_mut(&permission.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = permission.clone();
        Ok(())
    }
}

#[async_trait]
impl JobOfferRepository for InMemoryRepository {
    async fn find_job_offer_by_id(&self, id: i64) -> Result<Option<JobOffer>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .job_offers
            .get(&id)
            .map(|offer| tables.job_offer(offer)))
    }

    async fn list_job_offers(&self) -> Result<Vec<JobOffer>, RepositoryError> {
        let tables = self.tables();
        let mut offers: Vec<JobOffer> = tables
            .job_offers
            .values()
            .filter(|offer| !offer.is_deleted())
            .map(|offer| tables.job_offer(offer))
            .collect();
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(offers)
    }

    async fn insert_job_offer(&self, offer: NewJobOffer) -> Result<JobOffer, RepositoryError> {
        let mut tables = self.tables();
        let now = Utc::now();
        let id = tables.job_offer_seq.next();
        let offer = JobOffer {
            id,
            title: offer.title,
            description: offer.description,
            company_name: offer.company_name,
            location: offer.location,
            salary_range: offer.salary_range,
            employment_type: offer.employment_type,
            status: offer.status,
            requirements: offer.requirements,
            application_count: 0,
            deletion: DeletionState::Active,
            created_at: now,
            updated_at: now,
        };
        tables.job_offers.insert(id, offer.clone());
        Ok(offer)
    }

    async fn update_job_offer(&self, offer: &JobOffer) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        let stored = tables
            .job_offers
            .get_mut(&offer.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = JobOffer {
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..offer.clone()
        };
        Ok(())
    }
}

#[async_trait]
impl JobApplicationRepository for InMemoryRepository {
    async fn find_application_by_id(
        &self,
        id: i64,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        Ok(self.tables().applications.get(&id).cloned())
    }

    async fn find_application_by_user_and_offer(
        &self,
        user_id: i64,
        job_offer_id: i64,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        Ok(self
            .tables()
            .live_application(user_id, job_offer_id)
            .cloned())
    }

    async fn list_applications(
        &self,
        job_offer_id: Option<i64>,
    ) -> Result<Vec<JobApplicationResponse>, RepositoryError> {
        let tables = self.tables();
        let mut listing: Vec<JobApplicationResponse> = tables
            .applications
            .values()
            .filter(|application| !application.is_deleted())
            .filter(|application| job_offer_id.is_none_or(|id| application.job_offer_id == id))
            .filter_map(|application| {
                let user = tables.users.get(&application.user_id)?;
                let offer = tables.job_offers.get(&application.job_offer_id)?;
                Some(JobApplicationResponse::new(
                    application,
                    &tables.user(user),
                    offer,
                ))
            })
            .collect();
        listing.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(listing)
    }

    async fn insert_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, RepositoryError> {
        let mut tables = self.tables();
        if tables
            .live_application(application.user_id, application.job_offer_id)
            .is_some()
        {
            return Err(RepositoryError::Conflict(
                "job_applications_active_user_offer_idx".to_string(),
            ));
        }

        let id = tables.application_seq.next();
        let stored = JobApplication {
            id,
            user_id: application.user_id,
            job_offer_id: application.job_offer_id,
            created_at: Utc::now(),
            deletion: DeletionState::Active,
        };
        tables.applications.insert(id, stored.clone());
        self.application_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update_application(
        &self,
        application: &JobApplication,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        let stored = tables
            .applications
            .get_mut(&application.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.deletion = application.deletion;
        self.application_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
