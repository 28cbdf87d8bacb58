use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, query_builder::QueryBuilder};

use super::{
    JobApplicationRepository, JobOfferRepository, PermissionRepository, RoleRepository,
    UserRepository,
};
use crate::{
    error::RepositoryError,
    models::{
        DeletionState, Email, JobApplication, JobApplicationResponse, JobOffer, NewJobApplication,
        NewJobOffer, NewUser, Permission, Role, User,
    },
};

// --- Row Mappings ---
// Rows mirror the table layout one to one; the domain entities are rebuilt from them so the
// normalization rules in `models` apply to everything read back from the database.

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn into_user(self) -> Result<User, RepositoryError> {
        let email = Email::parse(&self.email)
            .map_err(|e| RepositoryError::InvalidData(format!("user {}: {e}", self.id)))?;
        let mut user = User::new(self.id, email, &self.name, &self.password_hash);
        user.deletion = DeletionState::from_timestamp(self.deleted_at);
        user.created_at = self.created_at;
        user.updated_at = self.updated_at;
        Ok(user)
    }
}

#[derive(Debug, Clone, FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl RoleRow {
    fn into_role(self) -> Role {
        let mut role = Role::new(self.id, &self.name, self.description);
        role.deletion = DeletionState::from_timestamp(self.deleted_at);
        role.created_at = self.created_at;
        role.updated_at = self.updated_at;
        role
    }
}

#[derive(Debug, Clone, FromRow)]
struct PermissionRow {
    id: i64,
    name: String,
    description: Option<String>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission::new(row.id, &row.name, row.description)
    }
}

/// One (role, permission) grant joined with the permission's columns.
#[derive(Debug, FromRow)]
struct GrantRow {
    role_id: i64,
    #[sqlx(flatten)]
    permission: PermissionRow,
}

/// One (user, role) assignment joined with the role's columns.
#[derive(Debug, FromRow)]
struct AssignmentRow {
    user_id: i64,
    #[sqlx(flatten)]
    role: RoleRow,
}

#[derive(Debug, FromRow)]
struct JobOfferRow {
    id: i64,
    title: String,
    description: String,
    company_name: Option<String>,
    location: Option<String>,
    salary_range: Option<String>,
    employment_type: Option<String>,
    status: String,
    requirements: Vec<String>,
    application_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<JobOfferRow> for JobOffer {
    fn from(row: JobOfferRow) -> Self {
        JobOffer {
            id: row.id,
            title: row.title,
            description: row.description,
            company_name: row.company_name,
            location: row.location,
            salary_range: row.salary_range,
            employment_type: row.employment_type,
            status: row.status,
            requirements: row.requirements,
            application_count: row.application_count,
            deletion: DeletionState::from_timestamp(row.deleted_at),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct JobApplicationRow {
    id: i64,
    user_id: i64,
    job_offer_id: i64,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<JobApplicationRow> for JobApplication {
    fn from(row: JobApplicationRow) -> Self {
        JobApplication {
            id: row.id,
            user_id: row.user_id,
            job_offer_id: row.job_offer_id,
            created_at: row.created_at,
            deletion: DeletionState::from_timestamp(row.deleted_at),
        }
    }
}

const USER_COLUMNS: &str = "id, email, name, password_hash, created_at, updated_at, deleted_at";
const ROLE_COLUMNS: &str = "id, name, description, created_at, updated_at, deleted_at";
const APPLICATION_COLUMNS: &str = "id, user_id, job_offer_id, created_at, deleted_at";

// application_count is derived, never stored.
const JOB_OFFER_SELECT: &str = r#"
    SELECT
        o.id, o.title, o.description, o.company_name, o.location,
        o.salary_range, o.employment_type, o.status, o.requirements,
        o.created_at, o.updated_at, o.deleted_at,
        (SELECT COUNT(*) FROM job_applications a
            WHERE a.job_offer_id = o.id AND a.deleted_at IS NULL) AS application_count
    FROM job_offers o
"#;

/// Converts a driver error and logs it, unless it is an expected uniqueness conflict.
fn storage_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |err| {
        let err = RepositoryError::from(err);
        if !matches!(err, RepositoryError::Conflict(_)) {
            tracing::error!("{} error: {:?}", operation, err);
        }
        err
    }
}

/// PostgresRepository
///
/// The concrete implementation of the store contracts, backed by the PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches the granted permissions to each role row.
    async fn hydrate_roles(&self, rows: Vec<RoleRow>) -> Result<Vec<Role>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let role_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();

        let grants = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT rp.role_id, p.id, p.name, p.description
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = ANY($1)
            "#,
        )
        .bind(&role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("hydrate_roles"))?;

        let mut by_role: BTreeMap<i64, Vec<Permission>> = BTreeMap::new();
        for grant in grants {
            by_role
                .entry(grant.role_id)
                .or_default()
                .push(grant.permission.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut role = row.into_role();
                for permission in by_role.remove(&role.id).unwrap_or_default() {
                    role.add_permission(permission);
                }
                role
            })
            .collect())
    }

    /// Attaches the assigned roles (with their permissions) to each user row.
    /// Soft-deleted roles stay attached until revoked; `rbac` ignores them.
    async fn hydrate_users(&self, rows: Vec<UserRow>) -> Result<Vec<User>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let user_ids: Vec<i64> = rows.iter().map(|row| row.id).collect();

        let assignments = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT ur.user_id, r.id, r.name, r.description, r.created_at, r.updated_at, r.deleted_at
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ANY($1)
            "#,
        )
        .bind(&user_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("hydrate_users"))?;

        let mut distinct_roles: BTreeMap<i64, RoleRow> = BTreeMap::new();
        let mut role_ids_by_user: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for assignment in assignments {
            role_ids_by_user
                .entry(assignment.user_id)
                .or_default()
                .push(assignment.role.id);
            distinct_roles.insert(assignment.role.id, assignment.role);
        }

        let roles: BTreeMap<i64, Role> = self
            .hydrate_roles(distinct_roles.into_values().collect())
            .await?
            .into_iter()
            .map(|role| (role.id, role))
            .collect();

        rows.into_iter()
            .map(|row| {
                let mut user = row.into_user()?;
                for role_id in role_ids_by_user.remove(&user.id).unwrap_or_default() {
                    if let Some(role) = roles.get(&role_id) {
                        user.add_role(role.clone());
                    }
                }
                Ok(user)
            })
            .collect()
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("find_user_by_id"))?;

        Ok(self.hydrate_users(row.into_iter().collect()).await?.pop())
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("find_user_by_email"))?;

        Ok(self.hydrate_users(row.into_iter().collect()).await?.pop())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("list_users"))?;

        self.hydrate_users(rows).await
    }

    /// insert_user
    ///
    /// Inserts the user and the initial role assignments in one transaction.
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage_error("insert_user"))?;

        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user.email.as_str())
        .bind(&user.name)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error("insert_user"))?;

        for role_id in &user.role_ids {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error("insert_user"))?;
        }

        tx.commit().await.map_err(storage_error("insert_user"))?;

        self.find_user_by_id(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// update_user
    ///
    /// Writes the scalar columns and replaces the role assignments with the user's current set.
    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage_error("update_user"))?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, name = $3, password_hash = $4, deleted_at = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(user.email().as_str())
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.deletion.deleted_at())
        .execute(&mut *tx)
        .await
        .map_err(storage_error("update_user"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error("update_user"))?;

        for role_id in user.role_ids() {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(user.id)
                .bind(role_id)
                .execute(&mut *tx)
                .await
                .map_err(storage_error("update_user"))?;
        }

        tx.commit().await.map_err(storage_error("update_user"))
    }
}

#[async_trait]
impl RoleRepository for PostgresRepository {
    async fn find_role_by_id(&self, id: i64) -> Result<Option<Role>, RepositoryError> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("find_role_by_id"))?;

        Ok(self.hydrate_roles(row.into_iter().collect()).await?.pop())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1"
        ))
        .bind(Role::normalize_name(name))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("find_role_by_name"))?;

        Ok(self.hydrate_roles(row.into_iter().collect()).await?.pop())
    }

    async fn find_roles_by_ids(&self, ids: &[i64]) -> Result<Vec<Role>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("find_roles_by_ids"))?;

        self.hydrate_roles(rows).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>, RepositoryError> {
        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE deleted_at IS NULL ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("list_roles"))?;

        self.hydrate_roles(rows).await
    }

    async fn insert_role(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Role, RepositoryError> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "INSERT INTO roles (name, description) VALUES ($1, $2) RETURNING {ROLE_COLUMNS}"
        ))
        .bind(Role::normalize_name(name))
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error("insert_role"))?;

        Ok(row.into_role())
    }

    /// update_role
    ///
    /// Writes the scalar columns and replaces the grants with the role's current permission set.
    async fn update_role(&self, role: &Role) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage_error("update_role"))?;

        let result = sqlx::query(
            "UPDATE roles SET description = $2, deleted_at = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(role.id)
        .bind(&role.description)
        .bind(role.deletion.deleted_at())
        .execute(&mut *tx)
        .await
        .map_err(storage_error("update_role"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role.id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error("update_role"))?;

        for permission in role.permissions() {
            sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
                .bind(role.id)
                .bind(permission.id)
                .execute(&mut *tx)
                .await
                .map_err(storage_error("update_role"))?;
        }

        tx.commit().await.map_err(storage_error("update_role"))
    }
}

#[async_trait]
impl PermissionRepository for PostgresRepository {
    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, RepositoryError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            "SELECT id, name, description FROM permissions WHERE name = $1",
        )
        .bind(Permission::normalize_name(name))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("find_permission_by_name"))?;

        Ok(row.map(Permission::from))
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, RepositoryError> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            "SELECT id, name, description FROM permissions ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("list_permissions"))?;

        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn insert_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Permission, RepositoryError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            "INSERT INTO permissions (name, description) VALUES ($1, $2) RETURNING id, name, description",
        )
        .bind(Permission::normalize_name(name))
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error("insert_permission"))?;

        Ok(row.into())
    }

    async fn update_permission(&self, permission: &Permission) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE permissions SET name = $2, description = $3 WHERE id = $1")
            .bind(permission.id)
            .bind(permission.name())
            .bind(&permission.description)
            .execute(&self.pool)
            .await
            .map_err(storage_error("update_permission"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl JobOfferRepository for PostgresRepository {
    async fn find_job_offer_by_id(&self, id: i64) -> Result<Option<JobOffer>, RepositoryError> {
        let row = sqlx::query_as::<_, JobOfferRow>(&format!("{JOB_OFFER_SELECT} WHERE o.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("find_job_offer_by_id"))?;

        Ok(row.map(JobOffer::from))
    }

    async fn list_job_offers(&self) -> Result<Vec<JobOffer>, RepositoryError> {
        let rows = sqlx::query_as::<_, JobOfferRow>(&format!(
            "{JOB_OFFER_SELECT} WHERE o.deleted_at IS NULL ORDER BY o.created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("list_job_offers"))?;

        Ok(rows.into_iter().map(JobOffer::from).collect())
    }

    async fn insert_job_offer(&self, offer: NewJobOffer) -> Result<JobOffer, RepositoryError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO job_offers
                (title, description, company_name, location, salary_range, employment_type, status, requirements)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&offer.title)
        .bind(&offer.description)
        .bind(&offer.company_name)
        .bind(&offer.location)
        .bind(&offer.salary_range)
        .bind(&offer.employment_type)
        .bind(&offer.status)
        .bind(&offer.requirements)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error("insert_job_offer"))?;

        self.find_job_offer_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_job_offer(&self, offer: &JobOffer) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE job_offers
            SET title = $2, description = $3, company_name = $4, location = $5,
                salary_range = $6, employment_type = $7, status = $8, requirements = $9,
                deleted_at = $10, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(offer.id)
        .bind(&offer.title)
        .bind(&offer.description)
        .bind(&offer.company_name)
        .bind(&offer.location)
        .bind(&offer.salary_range)
        .bind(&offer.employment_type)
        .bind(&offer.status)
        .bind(&offer.requirements)
        .bind(offer.deletion.deleted_at())
        .execute(&self.pool)
        .await
        .map_err(storage_error("update_job_offer"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl JobApplicationRepository for PostgresRepository {
    async fn find_application_by_id(
        &self,
        id: i64,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        let row = sqlx::query_as::<_, JobApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM job_applications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("find_application_by_id"))?;

        Ok(row.map(JobApplication::from))
    }

    async fn find_application_by_user_and_offer(
        &self,
        user_id: i64,
        job_offer_id: i64,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        let row = sqlx::query_as::<_, JobApplicationRow>(&format!(
            r#"
            SELECT {APPLICATION_COLUMNS} FROM job_applications
            WHERE user_id = $1 AND job_offer_id = $2 AND deleted_at IS NULL
            "#
        ))
        .bind(user_id)
        .bind(job_offer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("find_application_by_user_and_offer"))?;

        Ok(row.map(JobApplication::from))
    }

    /// list_applications
    ///
    /// Enriched listing joined with applicant and offer. The optional offer filter is pushed
    /// through QueryBuilder so it stays parameterized.
    async fn list_applications(
        &self,
        job_offer_id: Option<i64>,
    ) -> Result<Vec<JobApplicationResponse>, RepositoryError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT
                a.id, a.job_offer_id, o.title AS job_offer_title,
                a.user_id, u.email AS user_email, u.name AS user_name, a.created_at
            FROM job_applications a
            JOIN job_offers o ON o.id = a.job_offer_id
            JOIN users u ON u.id = a.user_id
            WHERE a.deleted_at IS NULL
            "#,
        );

        if let Some(offer_id) = job_offer_id {
            builder.push(" AND a.job_offer_id = ");
            builder.push_bind(offer_id);
        }

        builder.push(" ORDER BY a.created_at DESC");

        builder
            .build_query_as::<JobApplicationResponse>()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("list_applications"))
    }

    /// insert_application
    ///
    /// The partial unique index on (user_id, job_offer_id) rejects a second live application;
    /// the violation surfaces as `RepositoryError::Conflict`.
    async fn insert_application(
        &self,
        application: NewJobApplication,
    ) -> Result<JobApplication, RepositoryError> {
        let row = sqlx::query_as::<_, JobApplicationRow>(&format!(
            "INSERT INTO job_applications (user_id, job_offer_id) VALUES ($1, $2) RETURNING {APPLICATION_COLUMNS}"
        ))
        .bind(application.user_id)
        .bind(application.job_offer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error("insert_application"))?;

        Ok(row.into())
    }

    async fn update_application(
        &self,
        application: &JobApplication,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE job_applications SET deleted_at = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(application.id)
        .bind(application.deletion.deleted_at())
        .execute(&self.pool)
        .await
        .map_err(storage_error("update_application"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
