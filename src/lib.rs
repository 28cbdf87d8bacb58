use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain core: entities, authorization rules, errors.
pub mod error;
pub mod models;
pub mod rbac;

// Use cases and their collaborators.
pub mod catalog;
pub mod events;
pub mod identity;
pub mod password;
pub mod repository;
pub mod workflow;

// Delivery: configuration, authentication, HTTP handlers, bootstrap commands.
pub mod auth;
pub mod cli;
pub mod config;
pub mod handlers;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use error::DomainError;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use events::{ChannelEventPublisher, EventPublisherState};
pub use password::{Argon2PasswordHasher, HasherState};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Auto-generated OpenAPI documentation, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::get_me, handlers::check_own_permission,
        handlers::list_job_offers, handlers::get_job_offer, handlers::apply_to_job,
        handlers::withdraw_application, handlers::get_user, handlers::update_user,
        handlers::admin_list_users, handlers::admin_create_user,
        handlers::admin_delete_user, handlers::admin_assign_role, handlers::admin_revoke_role,
        handlers::admin_check_permission, handlers::admin_list_roles, handlers::admin_create_role,
        handlers::admin_delete_role, handlers::admin_grant_permission,
        handlers::admin_revoke_permission, handlers::admin_list_permissions,
        handlers::admin_create_permission, handlers::admin_create_job_offer,
        handlers::admin_update_job_offer_status, handlers::admin_delete_job_offer,
        handlers::admin_list_applications
    ),
    components(
        schemas(
            models::LoginRequest, models::TokenResponse, models::CreateUserRequest,
            models::UpdateUserRequest, models::CreateRoleRequest, models::CreatePermissionRequest,
            models::CreateJobOfferRequest, models::UpdateJobOfferStatusRequest,
            models::ApplyToJobRequest, models::UserResponse, models::ProfileResponse,
            models::RoleResponse, models::PermissionResponse, models::PermissionCheckResponse,
            models::JobOfferResponse, models::JobApplicationResponse,
        )
    ),
    tags(
        (name = "job-board", description = "Job Board API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single, thread-safe container holding all application services and configuration,
/// shared across all incoming requests.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: users, roles, permissions, job offers and applications.
    pub repo: RepositoryState,
    /// Domain event hand-off (bounded channel in production).
    pub events: EventPublisherState,
    /// Password hashing (Argon2id in production).
    pub hasher: HasherState,
    /// Configuration: The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// These let handlers and extractors pull single components out of the shared AppState.
// The use-case services (IdentityService, CatalogService, ApplicationWorkflow) implement
// FromRef in their own modules.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for EventPublisherState {
    fn from_ref(app_state: &AppState) -> EventPublisherState {
        app_state.events.clone()
    }
}

impl FromRef<AppState> for HasherState {
    fn from_ref(app_state: &AppState) -> HasherState {
        app_state.hasher.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the `authenticated_routes`. If the `AuthUser` extractor
/// rejects (bad token, unknown or deleted user) the handler never runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Authentication plus the ROLE_ADMIN requirement for everything under `/admin`.
async fn admin_middleware(
    AuthUser { user, .. }: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, DomainError> {
    if let Err(err) = rbac::require_role(&user, rbac::ADMIN_ROLE) {
        tracing::debug!(user_id = user.id, "admin route refused");
        return Err(err);
    }
    Ok(next.run(request).await)
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global and scoped middleware,
/// and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: No middleware applied.
        .merge(public::public_routes())
        // Authenticated Routes: Protected by the `auth_middleware`.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin Routes: Nested under '/admin' and gated on ROLE_ADMIN.
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers (Applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, carrying the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echoes x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `TraceLayer` span: HTTP method, URI and the `x-request-id` header, so every log
/// line for a single request is correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
