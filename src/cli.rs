//! Bootstrap commands for the `job-board` binary.
//!
//! `serve` and `migrate` need a live database and are driven from `main`. Every other
//! command runs against a [`CommandContext`], so it works the same over Postgres or the
//! in-memory store.

use clap::{Args, Parser, Subcommand};

use crate::{
    catalog::CatalogService,
    error::DomainError,
    identity::{CreateUserCommand, IdentityService},
    models::{CreateJobOfferRequest, Email, Permission, Role, STATUS_ACTIVE, SoftDelete, User},
    password::HasherState,
    rbac,
    repository::RepositoryState,
};

/// job-board - Job board API server and admin tooling
#[derive(Debug, Parser)]
#[command(name = "job-board")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Defaults to `serve` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Run migrations, then start the HTTP API
    Serve,

    /// Apply pending database migrations and exit
    Migrate,

    /// Create the default permissions, roles, users and sample job offers (idempotent)
    Setup,

    /// Create a permission
    CreatePermission(CreatePermissionArgs),

    /// Create a role, optionally granting permissions
    CreateRole(CreateRoleArgs),

    /// Create a user (MEMBER unless --role is given)
    CreateUser(CreateUserArgs),

    /// Create a user holding the ADMIN role
    CreateAdmin(CreateAdminArgs),

    /// Create a job offer
    CreateJob(CreateJobArgs),
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct CreatePermissionArgs {
    /// Permission name, e.g. `job:write`
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct CreateRoleArgs {
    /// Role name, e.g. `RECRUITER`
    pub name: String,
    pub description: Option<String>,
    /// Permission to grant; repeatable
    #[arg(long = "permission")]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct CreateUserArgs {
    pub email: String,
    pub password: String,
    pub name: String,
    /// Role to assign; repeatable
    #[arg(long = "role")]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct CreateAdminArgs {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct CreateJobArgs {
    pub title: String,
    pub description: String,
    #[arg(long)]
    pub company: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub salary: Option<String>,
    #[arg(long)]
    pub employment_type: Option<String>,
    #[arg(long, default_value = STATUS_ACTIVE)]
    pub status: String,
    /// Requirement line; repeatable
    #[arg(long = "requirement")]
    pub requirements: Vec<String>,
}

// --- Default Catalogue ---

const DEFAULT_PERMISSIONS: [(&str, &str); 6] = [
    ("user:read", "Permission to list all users"),
    ("user:write", "Permission to create/edit users"),
    ("job:read", "Permission to view job offers"),
    ("job:write", "Permission to manage job offers"),
    ("application:write", "Permission to apply for jobs"),
    ("application:read", "Permission to view applications"),
];

const MEMBER_PERMISSIONS: [&str; 2] = ["job:read", "application:write"];

const ADMIN_DEFAULT_PERMISSIONS: [&str; 3] = ["user:read", "user:write", "job:write"];

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";
pub const DEFAULT_MEMBER_EMAIL: &str = "user@example.com";
pub const DEFAULT_PASSWORD: &str = "password";

struct SampleJob {
    title: &'static str,
    company: &'static str,
    location: &'static str,
    salary: &'static str,
    employment_type: &'static str,
    description: &'static str,
    requirements: &'static [&'static str],
}

const SAMPLE_JOBS: [SampleJob; 3] = [
    SampleJob {
        title: "Senior Rust Backend Engineer",
        company: "Ferrous Systems",
        location: "Berlin (Remote)",
        salary: "€90k - €130k",
        employment_type: "Full-time",
        description: "Building scalable HTTP services with Axum, Tokio and PostgreSQL.",
        requirements: &["Rust", "Tokio", "PostgreSQL", "Distributed systems"],
    },
    SampleJob {
        title: "Frontend Architect",
        company: "Northwind",
        location: "Amsterdam",
        salary: "€80k - €110k",
        employment_type: "Contract",
        description: "Leading the frontend platform with React and TypeScript.",
        requirements: &["React", "TypeScript", "Design systems"],
    },
    SampleJob {
        title: "Site Reliability Engineer",
        company: "Contoso",
        location: "Dublin",
        salary: "€85k - €120k",
        employment_type: "Full-time",
        description: "Keeping high-throughput services observable and available.",
        requirements: &["Kubernetes", "Observability", "Incident response"],
    },
];

/// SetupReport
///
/// How many records a `setup` run created. Everything zero means nothing was missing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SetupReport {
    pub permissions_created: usize,
    pub roles_created: usize,
    pub users_created: usize,
    pub job_offers_created: usize,
}

/// CommandContext
///
/// The services a bootstrap command needs, built over whichever store is in use.
#[derive(Clone)]
pub struct CommandContext {
    pub repo: RepositoryState,
    pub identity: IdentityService,
    pub catalog: CatalogService,
}

impl CommandContext {
    pub fn new(repo: RepositoryState, hasher: HasherState) -> Self {
        Self {
            identity: IdentityService::new(repo.clone(), hasher),
            catalog: CatalogService::new(repo.clone()),
            repo,
        }
    }

    /// Runs one store-backed command and returns a line for the operator.
    /// `serve` and `migrate` are rejected here; they belong to `main`.
    pub async fn execute(&self, command: Command) -> Result<String, DomainError> {
        match command {
            Command::Serve | Command::Migrate => Err(DomainError::Validation(
                "serve and migrate need a database connection".to_string(),
            )),
            Command::Setup => {
                let report = self.setup().await?;
                Ok(format!(
                    "Setup completed: {} permissions, {} roles, {} users, {} job offers created.",
                    report.permissions_created,
                    report.roles_created,
                    report.users_created,
                    report.job_offers_created
                ))
            }
            Command::CreatePermission(args) => {
                let permission = self
                    .identity
                    .create_permission(&args.name, args.description)
                    .await?;
                Ok(format!("Permission {} created.", permission.name()))
            }
            Command::CreateRole(args) => {
                let role = self
                    .identity
                    .create_role(&args.name, args.description)
                    .await?;
                for permission in &args.permissions {
                    self.identity.grant_permission(role.name(), permission).await?;
                }
                Ok(format!("Role {} created.", role.name()))
            }
            Command::CreateUser(args) => {
                let roles = if args.roles.is_empty() {
                    vec![rbac::BASELINE_ROLE.to_string()]
                } else {
                    args.roles
                };
                let user = self
                    .create_user_with_roles(args.email, args.password, args.name, &roles)
                    .await?;
                Ok(format!("User {} created with id {}.", user.email(), user.id))
            }
            Command::CreateAdmin(args) => {
                let (admin_role, _) = self
                    .ensure_role(rbac::ADMIN_ROLE, "Administrator")
                    .await?;
                for name in ADMIN_DEFAULT_PERMISSIONS {
                    let (permission, _) = self.ensure_permission(name, None).await?;
                    self.identity
                        .grant_permission(admin_role.name(), permission.name())
                        .await?;
                }
                let user = self
                    .create_user_with_roles(
                        args.email,
                        args.password,
                        args.name,
                        &[rbac::ADMIN_ROLE.to_string()],
                    )
                    .await?;
                Ok(format!(
                    "Admin user {} created with id {}.",
                    user.email(),
                    user.id
                ))
            }
            Command::CreateJob(args) => {
                let offer = self
                    .catalog
                    .create_job_offer(CreateJobOfferRequest {
                        title: args.title,
                        description: args.description,
                        company_name: args.company,
                        location: args.location,
                        salary_range: args.salary,
                        employment_type: args.employment_type,
                        status: Some(args.status),
                        requirements: args.requirements,
                    })
                    .await?;
                Ok(format!("Job offer {} created with id {}.", offer.title, offer.id))
            }
        }
    }

    /// setup
    ///
    /// Creates whatever part of the default catalogue is missing: the six permissions, ADMIN
    /// holding all of them, MEMBER holding `job:read` and `application:write`, a default admin
    /// and member account, and sample job offers if the catalog is empty.
    pub async fn setup(&self) -> Result<SetupReport, DomainError> {
        let mut report = SetupReport::default();

        let mut permissions = Vec::with_capacity(DEFAULT_PERMISSIONS.len());
        for (name, description) in DEFAULT_PERMISSIONS {
            let (permission, created) = self
                .ensure_permission(name, Some(description.to_string()))
                .await?;
            report.permissions_created += usize::from(created);
            permissions.push(permission);
        }

        let (admin_role, created) = self
            .ensure_role(rbac::ADMIN_ROLE, "Super Administrator")
            .await?;
        report.roles_created += usize::from(created);
        for permission in &permissions {
            self.identity
                .grant_permission(admin_role.name(), permission.name())
                .await?;
        }

        let (member_role, created) = self
            .ensure_role(rbac::BASELINE_ROLE, "Regular Application User")
            .await?;
        report.roles_created += usize::from(created);
        for name in MEMBER_PERMISSIONS {
            self.identity
                .grant_permission(member_role.name(), name)
                .await?;
        }

        let defaults = [
            (DEFAULT_ADMIN_EMAIL, "System Admin", admin_role.id),
            (DEFAULT_MEMBER_EMAIL, "Regular User", member_role.id),
        ];
        for (email, name, role_id) in defaults {
            let email = Email::parse(email)?;
            if self.repo.find_user_by_email(&email).await?.is_none() {
                self.identity
                    .create_user(CreateUserCommand {
                        email: email.to_string(),
                        password: DEFAULT_PASSWORD.to_string(),
                        name: name.to_string(),
                        role_ids: vec![role_id],
                    })
                    .await?;
                report.users_created += 1;
            }
        }

        if self.repo.list_job_offers().await?.is_empty() {
            for job in &SAMPLE_JOBS {
                self.catalog
                    .create_job_offer(CreateJobOfferRequest {
                        title: job.title.to_string(),
                        description: job.description.to_string(),
                        company_name: Some(job.company.to_string()),
                        location: Some(job.location.to_string()),
                        salary_range: Some(job.salary.to_string()),
                        employment_type: Some(job.employment_type.to_string()),
                        status: Some(STATUS_ACTIVE.to_string()),
                        requirements: job.requirements.iter().map(|r| r.to_string()).collect(),
                    })
                    .await?;
                report.job_offers_created += 1;
            }
        }

        tracing::info!(?report, "setup finished");
        Ok(report)
    }

    /// Finds a permission by name or creates it. The flag tells whether it was created.
    async fn ensure_permission(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<(Permission, bool), DomainError> {
        match self.repo.find_permission_by_name(name).await? {
            Some(permission) => Ok((permission, false)),
            None => Ok((self.identity.create_permission(name, description).await?, true)),
        }
    }

    /// Finds a role by name, restoring it if it was soft-deleted, or creates it.
    /// The flag tells whether anything was created or restored.
    async fn ensure_role(&self, name: &str, description: &str) -> Result<(Role, bool), DomainError> {
        let normalized = rbac::normalize_role_name(name);
        match self.repo.find_role_by_name(&normalized).await? {
            Some(role) if !role.is_deleted() => Ok((role, false)),
            Some(mut role) => {
                role.restore();
                self.repo.update_role(&role).await?;
                tracing::info!(role = %role.name(), "soft-deleted role restored");
                Ok((role, true))
            }
            None => Ok((
                self.identity
                    .create_role(&normalized, Some(description.to_string()))
                    .await?,
                true,
            )),
        }
    }

    /// Creates the account, creating any named role that does not exist yet.
    async fn create_user_with_roles(
        &self,
        email: String,
        password: String,
        name: String,
        roles: &[String],
    ) -> Result<User, DomainError> {
        let mut role_ids = Vec::with_capacity(roles.len());
        for role_name in roles {
            let (role, _) = self.ensure_role(role_name, "Created from the command line").await?;
            role_ids.push(role.id);
        }

        self.identity
            .create_user(CreateUserCommand {
                email,
                password,
                name,
                role_ids,
            })
            .await
    }
}
