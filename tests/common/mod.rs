#![allow(dead_code)]

use async_trait::async_trait;
use job_board::{
    AppState,
    auth,
    catalog::CatalogService,
    config::AppConfig,
    error::RepositoryError,
    events::{DomainEvent, EventPublisher, PublishError},
    identity::{CreateUserCommand, IdentityService},
    models::{
        CreateJobOfferRequest, Email, JobApplication, JobApplicationResponse, JobOffer,
        NewJobApplication, NewJobOffer, NewUser, Permission, Role, User,
    },
    password::{Argon2PasswordHasher, HasherState},
    rbac,
    repository::{
        InMemoryRepository, JobApplicationRepository, JobOfferRepository, PermissionRepository,
        RoleRepository, UserRepository,
    },
};
use std::sync::{Arc, Mutex};

pub const PASSWORD: &str = "correct horse battery staple";

/// Argon2id with the smallest valid cost, so tests that hash stay fast.
pub fn fast_hasher() -> HasherState {
    Arc::new(Argon2PasswordHasher::with_params(8, 1, 1).unwrap())
}

// --- Event Publisher Doubles ---

/// Records every published event; optionally refuses them all.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn published(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Closed);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

// --- Test Context ---

pub struct TestContext {
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub events: Arc<RecordingPublisher>,
}

pub fn test_context() -> TestContext {
    let repo = Arc::new(InMemoryRepository::new());
    let events = Arc::new(RecordingPublisher::default());
    let state = AppState {
        repo: repo.clone(),
        events: events.clone(),
        hasher: fast_hasher(),
        config: AppConfig::default(),
    };
    TestContext {
        state,
        repo,
        events,
    }
}

impl TestContext {
    pub fn identity(&self) -> IdentityService {
        IdentityService::new(self.state.repo.clone(), self.state.hasher.clone())
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.state.repo.clone())
    }

    pub fn bearer(&self, user_id: i64) -> String {
        let token = auth::issue_token(user_id, &self.state.config).unwrap();
        format!("Bearer {}", token.access_token)
    }

    pub async fn seed_member(&self, email: &str) -> User {
        self.identity()
            .create_user(CreateUserCommand {
                email: email.to_string(),
                password: PASSWORD.to_string(),
                name: "Test Member".to_string(),
                role_ids: vec![],
            })
            .await
            .unwrap()
    }

    pub async fn seed_admin(&self, email: &str) -> User {
        let identity = self.identity();
        let role = match identity.find_active_role(rbac::ADMIN_ROLE).await {
            Ok(role) => role,
            Err(_) => identity
                .create_role(rbac::ADMIN_ROLE, Some("Administrator".to_string()))
                .await
                .unwrap(),
        };
        identity
            .create_user(CreateUserCommand {
                email: email.to_string(),
                password: PASSWORD.to_string(),
                name: "Test Admin".to_string(),
                role_ids: vec![role.id],
            })
            .await
            .unwrap()
    }

    pub async fn seed_job_offer(&self, title: &str, status: &str) -> JobOffer {
        self.catalog()
            .create_job_offer(CreateJobOfferRequest {
                title: title.to_string(),
                description: format!("{title} description"),
                status: Some(status.to_string()),
                ..Default::default()
            })
            .await
            .unwrap()
    }
}

// --- Spy Repository ---

/// Wraps the in-memory store, logging which lookups ran. With `stale_duplicate_check` the
/// duplicate lookup always reports "none", as if another request committed in between.
pub struct SpyRepository {
    pub inner: InMemoryRepository,
    pub calls: Mutex<Vec<&'static str>>,
    pub stale_duplicate_check: bool,
}

impl SpyRepository {
    pub fn new(stale_duplicate_check: bool) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            calls: Mutex::new(Vec::new()),
            stale_duplicate_check,
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl UserRepository for SpyRepository {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        self.record("find_user_by_id");
        self.inner.find_user_by_id(id).await
    }
    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.inner.find_user_by_email(email).await
    }
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        self.inner.list_users().await
    }
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        self.inner.insert_user(user).await
    }
    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        self.inner.update_user(user).await
    }
}

#[async_trait]
impl RoleRepository for SpyRepository {
    async fn find_role_by_id(&self, id: i64) -> Result<Option<Role>, RepositoryError> {
        self.inner.find_role_by_id(id).await
    }
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError> {
        self.inner.find_role_by_name(name).await
    }
    async fn find_roles_by_ids(&self, ids: &[i64]) -> Result<Vec<Role>, RepositoryError> {
        self.inner.find_roles_by_ids(ids).await
    }
    async fn list_roles(&self) -> Result<Vec<Role>, RepositoryError> {
        self.inner.list_roles().await
    }
    async fn insert_role(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Role, RepositoryError> {
        self.inner.insert_role(name, description).await
    }
    async fn update_role(&self, role: &Role) -> Result<(), RepositoryError> {
        self.inner.update_role(role).await
    }
}

#[async_trait]
impl PermissionRepository for SpyRepository {
    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, RepositoryError> {
        self.inner.find_permission_by_name(name).await
    }
    async fn list_permissions(&self) -> Result<Vec<Permission>, RepositoryError> {
        self.inner.list_permissions().await
    }
    async fn insert_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Permission, RepositoryError> {
        self.inner.insert_permission(name, description).await
    }
    async fn update_permission(&self, permission: &Permission) -> Result<(), RepositoryError> {
        self.inner.update_permission(permission).await
    }
}

#[async_trait]
impl JobOfferRepository for SpyRepository {
    async fn find_job_offer_by_id(&self, id: i64) -> Result<Option<JobOffer>, RepositoryError> {
        self.record("find_job_offer_by_id");
        self.inner.find_job_offer_by_id(id).await
    }
    async fn list_job_offers(&self) -> Result<Vec<JobOffer>, RepositoryError> {
        self.inner.list_job_offers().await
    }
    async fn insert_job_offer(&self, offer: NewJobOffer) -> Result<JobOffer, RepositoryError> {
        self.inner.insert_job_offer(offer).await
    }
    async fn update_job_offer(&self, offer: &JobOffer) -> Result<(), RepositoryError> {
        self.record("update_job_offer");
        self.inner.update_job_offer(offer).await
    }
}

#[async_trait]
impl JobApplicationRepository for SpyRepository {
    async fn find_application_by_id(
        &self,
        id: i64,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        self.inner.find_application_by_id(id).await
    }
    async fn find_application_by_user_and_offer(
        &self,
        user_id: i64,
        job_offer_id: i64,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        self.record("find_application_by_user_and_offer");
        if self.stale_duplicate_check {
            return Ok(None);
        }
        self.inner
            .find_application_by_user_and_offer(user_id, job_offer_id)
            .await
    }
    async fn list_applications(
        &self,
        job_offer_id: Option<i64>,
    ) -> Result<Vec<JobApplicationResponse>, RepositoryError> {
        self.inner.list_applications(job_offer_id).await
    }
    async fn insert_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, RepositoryError> {
        self.record("insert_application");
        self.inner.insert_application(application).await
    }
    async fn update_application(
        &self,
        application: &JobApplication,
    ) -> Result<(), RepositoryError> {
        self.inner.update_application(application).await
    }
}
