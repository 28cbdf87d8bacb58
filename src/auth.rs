use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    error::DomainError,
    models::{SoftDelete, TokenResponse, User},
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the HS256 access tokens issued by `POST /auth/login`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id, as a decimal string.
    pub sub: String,
    /// Expiration Time (exp): Timestamp after which the JWT must not be accepted.
    pub exp: usize,
    /// Issued At (iat): Timestamp when the JWT was issued.
    pub iat: usize,
}

/// issue_token
///
/// Signs an access token for the user with the configured secret and lifetime.
pub fn issue_token(user_id: i64, config: &AppConfig) -> Result<TokenResponse, DomainError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + config.jwt_ttl_secs) as usize,
        iat: now as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| DomainError::Token(e.to_string()))?;

    Ok(TokenResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: config.jwt_ttl_secs,
    })
}

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request: the caller's id and the freshly loaded
/// user, roles and permissions included, so handlers can run RBAC checks without another lookup.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub user: User,
}

/// Loads the user behind a token or bypass header. Missing and soft-deleted users are
/// rejected; a failing store is a server error, not an authentication failure.
async fn resolve_user(repo: &RepositoryState, user_id: i64) -> Result<AuthUser, StatusCode> {
    match repo.find_user_by_id(user_id).await {
        Ok(Some(user)) if !user.is_deleted() => Ok(AuthUser { id: user.id, user }),
        Ok(_) => Err(StatusCode::UNAUTHORIZED),
        Err(e) => {
            tracing::error!("auth user lookup error: {:?}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// AuthUser Extractor Implementation
///
/// The process involves:
/// 1. Dependency Resolution: Accessing Repository and AppConfig from the application state.
/// 2. Local Bypass: Allowing development-time access using the 'x-user-id' header.
/// 3. Token Validation: Standard Bearer token extraction and JWT decoding.
/// 4. DB Lookup: Reloading the user so revoked roles and deleted accounts take effect at once.
///
/// Rejection: StatusCode::UNAUTHORIZED (401) on any authentication failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // Local Development Bypass: a known user id in 'x-user-id'. Falls through to the
        // token flow when the header is absent or does not resolve.
        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.trim().parse::<i64>().ok());
            if let Some(user_id) = bypass_id {
                if let Ok(auth_user) = resolve_user(&repo, user_id).await {
                    return Ok(auth_user);
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!("rejected token: {:?}", other),
            }
            StatusCode::UNAUTHORIZED
        })?;

        let user_id = token_data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        resolve_user(&repo, user_id).await
    }
}
