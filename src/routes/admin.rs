use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};

/// Admin Router Module
///
/// Identity and catalog management, nested under `/admin`.
///
/// Access Control:
/// `create_router` wraps this router in a layer that authenticates the caller and requires
/// ROLE_ADMIN before any handler runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Users ---
        // GET/POST /admin/v1/users
        .route(
            "/v1/users",
            get(handlers::admin_list_users).post(handlers::admin_create_user),
        )
        // DELETE /admin/v1/users/{id}
        // Soft delete. The account can no longer log in or use existing tokens.
        .route("/v1/users/{id}", delete(handlers::admin_delete_user))
        // POST/DELETE /admin/v1/users/{id}/roles/{role}
        .route(
            "/v1/users/{id}/roles/{role}",
            post(handlers::admin_assign_role).delete(handlers::admin_revoke_role),
        )
        // GET /admin/v1/users/{id}/permissions/{permission}
        // Authorization query: does the user hold the permission through any role.
        .route(
            "/v1/users/{id}/permissions/{permission}",
            get(handlers::admin_check_permission),
        )
        // --- Roles & Permissions ---
        .route(
            "/v1/roles",
            get(handlers::admin_list_roles).post(handlers::admin_create_role),
        )
        .route("/v1/roles/{role}", delete(handlers::admin_delete_role))
        .route(
            "/v1/roles/{role}/permissions/{permission}",
            post(handlers::admin_grant_permission).delete(handlers::admin_revoke_permission),
        )
        .route(
            "/v1/permissions",
            get(handlers::admin_list_permissions).post(handlers::admin_create_permission),
        )
        // --- Job Catalog ---
        .route("/v1/job-offers", post(handlers::admin_create_job_offer))
        .route("/v1/job-offers/{id}", delete(handlers::admin_delete_job_offer))
        // PATCH /admin/v1/job-offers/{id}/status
        // Setting anything other than "active" stops new applications.
        .route(
            "/v1/job-offers/{id}/status",
            patch(handlers::admin_update_job_offer_status),
        )
        // GET /admin/v1/job-applications?job_offer_id=...
        .route(
            "/v1/job-applications",
            get(handlers::admin_list_applications),
        )
}
