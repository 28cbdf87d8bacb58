use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Authenticated Router Module
///
/// Routes available to any signed-in user (the implicit ROLE_MEMBER). The `AuthUser`
/// middleware above this router guarantees a live, resolved identity; handlers that act on
/// another user's record run their own self-or-admin check.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The caller's profile, effective role labels and permissions.
        .route("/me", get(handlers::get_me))
        // GET /me/permissions/{permission}
        // 204 when the caller holds the permission, 403 otherwise.
        .route(
            "/me/permissions/{permission}",
            get(handlers::check_own_permission),
        )
        // --- Job Catalog ---
        // GET /v1/job-offers
        // Live job offers, closed ones included, newest first.
        .route("/v1/job-offers", get(handlers::list_job_offers))
        // GET /v1/job-offers/{id}
        .route("/v1/job-offers/{id}", get(handlers::get_job_offer))
        // --- Applications ---
        // POST /v1/job-applications
        // The apply-to-job workflow. The applicant is always the caller.
        .route("/v1/job-applications", post(handlers::apply_to_job))
        // DELETE /v1/job-applications/{id}
        // Withdraws (soft-deletes) the caller's own application.
        .route(
            "/v1/job-applications/{id}",
            delete(handlers::withdraw_application),
        )
        // --- Users ---
        // GET/PATCH /v1/users/{id}
        // Self or admin.
        .route(
            "/v1/users/{id}",
            get(handlers::get_user).patch(handlers::update_user),
        )
}
