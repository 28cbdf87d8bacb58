use crate::{
    auth::{self, AuthUser},
    catalog::CatalogService,
    config::AppConfig,
    error::DomainError,
    identity::{CreateUserCommand, IdentityService},
    models::{
        ApplyToJobRequest, CreateJobOfferRequest, CreatePermissionRequest, CreateRoleRequest,
        CreateUserRequest, JobApplicationResponse, JobOfferResponse, LoginRequest,
        PermissionCheckResponse, PermissionResponse, ProfileResponse, RoleResponse, TokenResponse,
        UpdateJobOfferStatusRequest, UpdateUserRequest, UserResponse,
    },
    rbac,
    repository::RepositoryState,
    workflow::{ApplicationWorkflow, ApplyToJobCommand, SubmittedApplication},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

// --- Filter Structs ---

/// ApplicationFilter
///
/// Query parameters for the admin application listing (GET /admin/v1/job-applications).
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ApplicationFilter {
    /// Restrict the listing to one job offer.
    pub job_offer_id: Option<i64>,
}

// --- Public Handlers ---

/// login
///
/// [Public Route] Exchanges email and password for a signed bearer token.
/// Unknown accounts, deleted accounts and wrong passwords all yield the same 401.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(identity): State<IdentityService>,
    State(config): State<AppConfig>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, DomainError> {
    let user = identity
        .authenticate(&payload.email, &payload.password)
        .await?;
    let token = auth::issue_token(user.id, &config)?;
    tracing::info!(user_id = user.id, "login succeeded");
    Ok(Json(token))
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] The caller's profile with effective role labels and permissions.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current user profile", body = ProfileResponse))
)]
pub async fn get_me(AuthUser { user, .. }: AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(&user))
}

/// check_own_permission
///
/// [Authenticated Route] Succeeds with no content when the caller holds the permission through
/// a live role, 403 otherwise.
#[utoipa::path(
    get,
    path = "/me/permissions/{permission}",
    params(("permission" = String, Path, description = "Permission name")),
    responses(
        (status = 204, description = "Permission held"),
        (status = 403, description = "Permission not held")
    )
)]
pub async fn check_own_permission(
    AuthUser { user, .. }: AuthUser,
    Path(permission): Path<String>,
) -> Result<StatusCode, DomainError> {
    rbac::require_permission(&user, &permission)?;
    Ok(StatusCode::NO_CONTENT)
}

/// list_job_offers
///
/// [Authenticated Route] Every job offer that has not been deleted, newest first.
/// Closed offers are listed too; only applying to them is refused.
#[utoipa::path(
    get,
    path = "/v1/job-offers",
    responses((status = 200, description = "Job offers", body = [JobOfferResponse]))
)]
pub async fn list_job_offers(
    State(repo): State<RepositoryState>,
) -> Result<Json<Vec<JobOfferResponse>>, DomainError> {
    let offers = repo.list_job_offers().await?;
    Ok(Json(offers.iter().map(JobOfferResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/job-offers/{id}",
    params(("id" = i64, Path, description = "Job offer id")),
    responses(
        (status = 200, description = "Job offer", body = JobOfferResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_job_offer(
    State(catalog): State<CatalogService>,
    Path(id): Path<i64>,
) -> Result<Json<JobOfferResponse>, DomainError> {
    let offer = catalog.find_active_job_offer(id).await?;
    Ok(Json(JobOfferResponse::from(&offer)))
}

/// apply_to_job
///
/// [Authenticated Route] Applies the caller to a job offer.
///
/// *Rules*: the offer must exist, must not be deleted and must be `active`; a caller holds at
/// most one live application per offer. A `job_applied` event is published on success.
#[utoipa::path(
    post,
    path = "/v1/job-applications",
    request_body = ApplyToJobRequest,
    responses(
        (status = 201, description = "Application submitted", body = JobApplicationResponse),
        (status = 400, description = "Job closed or already applied"),
        (status = 404, description = "User or job offer not found")
    )
)]
pub async fn apply_to_job(
    AuthUser { id, user }: AuthUser,
    State(workflow): State<ApplicationWorkflow>,
    Json(payload): Json<ApplyToJobRequest>,
) -> Result<(StatusCode, Json<JobApplicationResponse>), DomainError> {
    let SubmittedApplication {
        application,
        job_offer,
    } = workflow
        .submit(ApplyToJobCommand {
            user_id: id,
            job_offer_id: payload.job_offer_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(JobApplicationResponse::new(&application, &user, &job_offer)),
    ))
}

/// withdraw_application
///
/// [Authenticated Route] Soft-deletes one of the caller's own applications.
#[utoipa::path(
    delete,
    path = "/v1/job-applications/{id}",
    params(("id" = i64, Path, description = "Job application id")),
    responses(
        (status = 204, description = "Withdrawn"),
        (status = 403, description = "Not the applicant"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn withdraw_application(
    AuthUser { id: user_id, .. }: AuthUser,
    State(catalog): State<CatalogService>,
    Path(id): Path<i64>,
) -> Result<StatusCode, DomainError> {
    catalog.withdraw_application(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_user
///
/// [Authenticated Route] A single user. Callers may read themselves; admins may read anyone.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    AuthUser { user: caller, .. }: AuthUser,
    State(identity): State<IdentityService>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, DomainError> {
    rbac::require_self_or_admin(&caller, id)?;
    let user = identity.find_active_user(id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// update_user
///
/// [Authenticated Route] Partial profile update (name and/or password). Self or admin.
#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user(
    AuthUser { user: caller, .. }: AuthUser,
    State(identity): State<IdentityService>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, DomainError> {
    rbac::require_self_or_admin(&caller, id)?;
    let user = identity.update_profile(id, payload).await?;
    Ok(Json(UserResponse::from(&user)))
}

// --- Admin Handlers ---
// The admin router is wrapped in a layer that requires ROLE_ADMIN before any of these run.

/// admin_list_users
///
/// [Admin Route] All live users with their effective role labels.
#[utoipa::path(
    get,
    path = "/admin/v1/users",
    responses((status = 200, description = "Users", body = [UserResponse]))
)]
pub async fn admin_list_users(
    State(repo): State<RepositoryState>,
) -> Result<Json<Vec<UserResponse>>, DomainError> {
    let users = repo.list_users().await?;
    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

/// admin_create_user
///
/// [Admin Route] Creates an account. Unknown role ids are ignored.
#[utoipa::path(
    post,
    path = "/admin/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn admin_create_user(
    State(identity): State<IdentityService>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), DomainError> {
    let user = identity
        .create_user(CreateUserCommand {
            email: payload.email,
            password: payload.password,
            name: payload.name,
            role_ids: payload.role_ids,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

#[utoipa::path(
    delete,
    path = "/admin/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn admin_delete_user(
    State(identity): State<IdentityService>,
    Path(id): Path<i64>,
) -> Result<StatusCode, DomainError> {
    identity.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// admin_assign_role
///
/// [Admin Route] Assigns a role by name (`ADMIN`, `admin` and `ROLE_ADMIN` are equivalent).
#[utoipa::path(
    post,
    path = "/admin/v1/users/{id}/roles/{role}",
    params(
        ("id" = i64, Path, description = "User id"),
        ("role" = String, Path, description = "Role name")
    ),
    responses((status = 200, description = "Role assigned", body = UserResponse), (status = 404, description = "Not Found"))
)]
pub async fn admin_assign_role(
    State(identity): State<IdentityService>,
    Path((id, role)): Path<(i64, String)>,
) -> Result<Json<UserResponse>, DomainError> {
    let user = identity.assign_role(id, &role).await?;
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    delete,
    path = "/admin/v1/users/{id}/roles/{role}",
    params(
        ("id" = i64, Path, description = "User id"),
        ("role" = String, Path, description = "Role name")
    ),
    responses((status = 200, description = "Role revoked", body = UserResponse), (status = 404, description = "Not Found"))
)]
pub async fn admin_revoke_role(
    State(identity): State<IdentityService>,
    Path((id, role)): Path<(i64, String)>,
) -> Result<Json<UserResponse>, DomainError> {
    let user = identity.revoke_role(id, &role).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// admin_check_permission
///
/// [Admin Route] Whether a user holds a permission through any of their roles.
#[utoipa::path(
    get,
    path = "/admin/v1/users/{id}/permissions/{permission}",
    params(
        ("id" = i64, Path, description = "User id"),
        ("permission" = String, Path, description = "Permission name")
    ),
    responses((status = 200, description = "Check result", body = PermissionCheckResponse), (status = 404, description = "Not Found"))
)]
pub async fn admin_check_permission(
    State(identity): State<IdentityService>,
    Path((id, permission)): Path<(i64, String)>,
) -> Result<Json<PermissionCheckResponse>, DomainError> {
    let granted = identity.user_has_permission(id, &permission).await?;
    Ok(Json(PermissionCheckResponse {
        user_id: id,
        permission: crate::models::Permission::normalize_name(&permission),
        granted,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/v1/roles",
    responses((status = 200, description = "Roles", body = [RoleResponse]))
)]
pub async fn admin_list_roles(
    State(repo): State<RepositoryState>,
) -> Result<Json<Vec<RoleResponse>>, DomainError> {
    let roles = repo.list_roles().await?;
    Ok(Json(roles.iter().map(RoleResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/admin/v1/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Created", body = RoleResponse),
        (status = 409, description = "Role already exists")
    )
)]
pub async fn admin_create_role(
    State(identity): State<IdentityService>,
    Json(payload): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<RoleResponse>), DomainError> {
    let role = identity
        .create_role(&payload.name, payload.description)
        .await?;
    Ok((StatusCode::CREATED, Json(RoleResponse::from(&role))))
}

/// admin_delete_role
///
/// [Admin Route] Soft-deletes a role. Users keep the assignment row but the role stops
/// granting anything immediately.
#[utoipa::path(
    delete,
    path = "/admin/v1/roles/{role}",
    params(("role" = String, Path, description = "Role name")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn admin_delete_role(
    State(identity): State<IdentityService>,
    Path(role): Path<String>,
) -> Result<StatusCode, DomainError> {
    identity.delete_role(&role).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/admin/v1/roles/{role}/permissions/{permission}",
    params(
        ("role" = String, Path, description = "Role name"),
        ("permission" = String, Path, description = "Permission name")
    ),
    responses((status = 200, description = "Granted", body = RoleResponse), (status = 404, description = "Not Found"))
)]
pub async fn admin_grant_permission(
    State(identity): State<IdentityService>,
    Path((role, permission)): Path<(String, String)>,
) -> Result<Json<RoleResponse>, DomainError> {
    let role = identity.grant_permission(&role, &permission).await?;
    Ok(Json(RoleResponse::from(&role)))
}

#[utoipa::path(
    delete,
    path = "/admin/v1/roles/{role}/permissions/{permission}",
    params(
        ("role" = String, Path, description = "Role name"),
        ("permission" = String, Path, description = "Permission name")
    ),
    responses((status = 200, description = "Revoked", body = RoleResponse), (status = 404, description = "Not Found"))
)]
pub async fn admin_revoke_permission(
    State(identity): State<IdentityService>,
    Path((role, permission)): Path<(String, String)>,
) -> Result<Json<RoleResponse>, DomainError> {
    let role = identity.revoke_permission(&role, &permission).await?;
    Ok(Json(RoleResponse::from(&role)))
}

#[utoipa::path(
    get,
    path = "/admin/v1/permissions",
    responses((status = 200, description = "Permissions", body = [PermissionResponse]))
)]
pub async fn admin_list_permissions(
    State(repo): State<RepositoryState>,
) -> Result<Json<Vec<PermissionResponse>>, DomainError> {
    let permissions = repo.list_permissions().await?;
    Ok(Json(
        permissions.iter().map(PermissionResponse::from).collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/admin/v1/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Created", body = PermissionResponse),
        (status = 409, description = "Permission already exists")
    )
)]
pub async fn admin_create_permission(
    State(identity): State<IdentityService>,
    Json(payload): Json<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<PermissionResponse>), DomainError> {
    let permission = identity
        .create_permission(&payload.name, payload.description)
        .await?;
    Ok((StatusCode::CREATED, Json(PermissionResponse::from(&permission))))
}

/// admin_create_job_offer
///
/// [Admin Route] Publishes a job offer. Status defaults to `active`.
#[utoipa::path(
    post,
    path = "/admin/v1/job-offers",
    request_body = CreateJobOfferRequest,
    responses(
        (status = 201, description = "Created", body = JobOfferResponse),
        (status = 400, description = "Validation error")
    )
)]
pub async fn admin_create_job_offer(
    State(catalog): State<CatalogService>,
    Json(payload): Json<CreateJobOfferRequest>,
) -> Result<(StatusCode, Json<JobOfferResponse>), DomainError> {
    let offer = catalog.create_job_offer(payload).await?;
    Ok((StatusCode::CREATED, Json(JobOfferResponse::from(&offer))))
}

/// admin_update_job_offer_status
///
/// [Admin Route] Changes an offer's status, e.g. `closed` to stop new applications.
#[utoipa::path(
    patch,
    path = "/admin/v1/job-offers/{id}/status",
    params(("id" = i64, Path, description = "Job offer id")),
    request_body = UpdateJobOfferStatusRequest,
    responses(
        (status = 200, description = "Updated", body = JobOfferResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn admin_update_job_offer_status(
    State(catalog): State<CatalogService>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateJobOfferStatusRequest>,
) -> Result<Json<JobOfferResponse>, DomainError> {
    let offer = catalog.set_job_offer_status(id, &payload.status).await?;
    Ok(Json(JobOfferResponse::from(&offer)))
}

#[utoipa::path(
    delete,
    path = "/admin/v1/job-offers/{id}",
    params(("id" = i64, Path, description = "Job offer id")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn admin_delete_job_offer(
    State(catalog): State<CatalogService>,
    Path(id): Path<i64>,
) -> Result<StatusCode, DomainError> {
    catalog.delete_job_offer(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// admin_list_applications
///
/// [Admin Route] Live applications joined with applicant and offer, optionally for one offer.
#[utoipa::path(
    get,
    path = "/admin/v1/job-applications",
    params(ApplicationFilter),
    responses((status = 200, description = "Applications", body = [JobApplicationResponse]))
)]
pub async fn admin_list_applications(
    State(repo): State<RepositoryState>,
    Query(filter): Query<ApplicationFilter>,
) -> Result<Json<Vec<JobApplicationResponse>>, DomainError> {
    let applications = repo.list_applications(filter.job_offer_id).await?;
    Ok(Json(applications))
}
