use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that are **unauthenticated**. Everything else in the API requires a token
/// obtained from `/auth/login`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Used for monitoring and load balancer checks. Returns "ok" immediately.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/login
        // Exchanges email + password for an HS256 bearer token.
        .route("/auth/login", post(handlers::login))
}
