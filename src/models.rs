use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{error::DomainError, rbac};

/// The only job offer status the application workflow treats as open.
pub const STATUS_ACTIVE: &str = "active";

// --- Shared Value Objects ---

/// DeletionState
///
/// Soft-delete marker shared by every deletable record. A record is either live or was
/// deleted at a known instant; there is no "deleted without a timestamp" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeletionState {
    #[default]
    Active,
    Deleted { at: DateTime<Utc> },
}

impl DeletionState {
    /// Maps the nullable `deleted_at` column onto the tagged state.
    pub fn from_timestamp(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => DeletionState::Deleted { at },
            None => DeletionState::Active,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            DeletionState::Active => None,
            DeletionState::Deleted { at } => Some(*at),
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, DeletionState::Deleted { .. })
    }
}

/// SoftDelete
///
/// Common behaviour for records that are marked deleted instead of being erased.
pub trait SoftDelete {
    fn deletion(&self) -> DeletionState;
    fn set_deletion(&mut self, state: DeletionState);

    fn is_deleted(&self) -> bool {
        self.deletion().is_deleted()
    }

    /// Marks the record deleted. An already deleted record keeps its original timestamp.
    fn soft_delete(&mut self) {
        if !self.is_deleted() {
            self.set_deletion(DeletionState::Deleted { at: Utc::now() });
        }
    }

    fn restore(&mut self) {
        self.set_deletion(DeletionState::Active);
    }
}

/// Email
///
/// Normalized (trimmed, lowercased) and syntactically validated e-mail address.
/// Two addresses differing only in case compare equal once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_lowercase();
        if is_valid_email(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(DomainError::Validation(format!("Invalid email: {raw}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_email(candidate: &str) -> bool {
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty()
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
        || domain.contains('@')
    {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

// --- Identity Entities ---

/// Permission
///
/// Atomic capability. The name is lowercased once here, so every later comparison is plain equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: i64,
    name: String,
    pub description: Option<String>,
}

impl Permission {
    pub fn new(id: i64, name: &str, description: Option<String>) -> Self {
        Self {
            id,
            name: Self::normalize_name(name),
            description,
        }
    }

    pub fn normalize_name(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Role
///
/// Named grouping of permissions. Names are uppercased at construction and the permission
/// set is keyed by (normalized) permission name, which keeps it free of duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: i64,
    name: String,
    pub description: Option<String>,
    permissions: BTreeMap<String, Permission>,
    pub deletion: DeletionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(id: i64, name: &str, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: Self::normalize_name(name),
            description,
            permissions: BTreeMap::new(),
            deletion: DeletionState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn normalize_name(name: &str) -> String {
        name.trim().to_uppercase()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.keys().cloned().collect()
    }

    /// Adds the permission. Returns `false` when the role already held it.
    pub fn add_permission(&mut self, permission: Permission) -> bool {
        if self.permissions.contains_key(permission.name()) {
            return false;
        }
        self.permissions
            .insert(permission.name().to_string(), permission);
        true
    }

    /// Removes the permission by name. Returns `false` when the role did not hold it.
    pub fn remove_permission(&mut self, permission_name: &str) -> bool {
        self.permissions
            .remove(&Permission::normalize_name(permission_name))
            .is_some()
    }

    pub fn has_permission(&self, permission_name: &str) -> bool {
        self.permissions
            .contains_key(&Permission::normalize_name(permission_name))
    }
}

impl SoftDelete for Role {
    fn deletion(&self) -> DeletionState {
        self.deletion
    }

    fn set_deletion(&mut self, state: DeletionState) {
        self.deletion = state;
    }
}

/// User
///
/// An identity with a normalized email and a set of explicitly assigned roles.
/// The baseline role is never stored here; see [`rbac::effective_role_labels`].
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    email: Email,
    pub name: String,
    pub password_hash: String,
    roles: BTreeMap<String, Role>,
    pub deletion: DeletionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: i64, email: Email, name: &str, password_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            email,
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            roles: BTreeMap::new(),
            deletion: DeletionState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn set_email(&mut self, email: Email) {
        self.email = email;
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn role_ids(&self) -> Vec<i64> {
        self.roles.values().map(|role| role.id).collect()
    }

    /// Assigns the role. Returns `false` when it was already assigned.
    pub fn add_role(&mut self, role: Role) -> bool {
        if self.roles.contains_key(role.name()) {
            return false;
        }
        self.roles.insert(role.name().to_string(), role);
        true
    }

    /// Removes the role by name. Returns `false` when it was not assigned.
    pub fn remove_role(&mut self, role_name: &str) -> bool {
        self.roles.remove(&rbac::normalize_role_name(role_name)).is_some()
    }
}

impl SoftDelete for User {
    fn deletion(&self) -> DeletionState {
        self.deletion
    }

    fn set_deletion(&mut self, state: DeletionState) {
        self.deletion = state;
    }
}

/// NewUser
///
/// Insert payload for the identity store. The store assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub name: String,
    pub password_hash: String,
    pub role_ids: Vec<i64>,
}

// --- Job Catalog Entities ---

/// JobOffer
///
/// A published (or draft/closed) position. `status` is an open string; only
/// [`STATUS_ACTIVE`] accepts applications.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOffer {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub employment_type: Option<String>,
    pub status: String,
    pub requirements: Vec<String>,
    /// Number of non-deleted applications, computed by the store on read.
    pub application_count: i64,
    pub deletion: DeletionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobOffer {
    pub fn is_open(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

impl SoftDelete for JobOffer {
    fn deletion(&self) -> DeletionState {
        self.deletion
    }

    fn set_deletion(&mut self, state: DeletionState) {
        self.deletion = state;
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewJobOffer {
    pub title: String,
    pub description: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub employment_type: Option<String>,
    pub status: String,
    pub requirements: Vec<String>,
}

/// JobApplication
///
/// Link between one user and one job offer. Only the deletion marker ever changes.
#[derive(Debug, Clone, PartialEq)]
pub struct JobApplication {
    pub id: i64,
    pub user_id: i64,
    pub job_offer_id: i64,
    pub created_at: DateTime<Utc>,
    pub deletion: DeletionState,
}

impl SoftDelete for JobApplication {
    fn deletion(&self) -> DeletionState {
        self.deletion
    }

    fn set_deletion(&mut self, state: DeletionState) {
        self.deletion = state;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewJobApplication {
    pub user_id: i64,
    pub job_offer_id: i64,
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Credentials exchanged for a bearer token (POST /auth/login).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[schema(example = "user@example.com")]
    pub email: String,
    pub password: String,
}

/// CreateUserRequest
///
/// Admin payload for creating an account (POST /admin/v1/users).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role_ids: Vec<i64>,
}

/// UpdateUserRequest
///
/// Partial update of a user's own profile (PATCH /v1/users/{id}). Absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateRoleRequest {
    #[schema(example = "recruiter")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatePermissionRequest {
    #[schema(example = "job:write")]
    pub name: String,
    pub description: Option<String>,
}

/// CreateJobOfferRequest
///
/// Admin payload for publishing a job offer. `status` defaults to "active".
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateJobOfferRequest {
    pub title: String,
    pub description: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub employment_type: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateJobOfferStatusRequest {
    #[schema(example = "closed")]
    pub status: String,
}

/// ApplyToJobRequest
///
/// The applicant is always the authenticated caller, so only the offer is supplied.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ApplyToJobRequest {
    pub job_offer_id: i64,
}

// --- Response Schemas (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// UserResponse
///
/// Public view of a user. `roles` are the effective role labels, baseline included.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email().to_string(),
            name: user.name.clone(),
            roles: rbac::effective_role_labels(user).into_iter().collect(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// ProfileResponse
///
/// The authenticated caller's own profile (GET /me), including what they may do.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl From<&User> for ProfileResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email().to_string(),
            name: user.name.clone(),
            roles: rbac::effective_role_labels(user).into_iter().collect(),
            permissions: rbac::effective_permissions(user).into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RoleResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Role> for RoleResponse {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name().to_string(),
            description: role.description.clone(),
            permissions: role.permission_names(),
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PermissionResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

impl From<&Permission> for PermissionResponse {
    fn from(permission: &Permission) -> Self {
        Self {
            id: permission.id,
            name: permission.name().to_string(),
            description: permission.description.clone(),
        }
    }
}

/// PermissionCheckResponse
///
/// Answer to "does user X hold permission P" (admin authorization query).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PermissionCheckResponse {
    pub user_id: i64,
    pub permission: String,
    pub granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct JobOfferResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub salary_range: Option<String>,
    pub employment_type: Option<String>,
    pub status: String,
    pub requirements: Vec<String>,
    pub application_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<&JobOffer> for JobOfferResponse {
    fn from(offer: &JobOffer) -> Self {
        Self {
            id: offer.id,
            title: offer.title.clone(),
            description: offer.description.clone(),
            company_name: offer.company_name.clone(),
            location: offer.location.clone(),
            salary_range: offer.salary_range.clone(),
            employment_type: offer.employment_type.clone(),
            status: offer.status.clone(),
            requirements: offer.requirements.clone(),
            application_count: offer.application_count,
            created_at: offer.created_at,
            updated_at: offer.updated_at,
        }
    }
}

/// JobApplicationResponse
///
/// Enriched application view: the application joined with applicant and offer details.
/// Loaded directly by the repository's listing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct JobApplicationResponse {
    pub id: i64,
    pub job_offer_id: i64,
    pub job_offer_title: String,
    pub user_id: i64,
    pub user_email: String,
    pub user_name: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl JobApplicationResponse {
    pub fn new(application: &JobApplication, user: &User, offer: &JobOffer) -> Self {
        Self {
            id: application.id,
            job_offer_id: offer.id,
            job_offer_title: offer.title.clone(),
            user_id: user.id,
            user_email: user.email().to_string(),
            user_name: user.name.clone(),
            created_at: application.created_at,
        }
    }
}
