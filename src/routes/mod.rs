//! Router Module Index
//!
//! Organizes the application's routing logic into security-segregated modules. Access control
//! is applied at the module level (via Axum layers in `create_router`), so an endpoint cannot
//! be exposed by forgetting a check inside its handler.

/// Routes accessible to anonymous clients: health check and login.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;

/// Routes restricted to callers holding ROLE_ADMIN.
pub mod admin;
