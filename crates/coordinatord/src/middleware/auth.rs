//! Authentication middleware for the admin REST surface (spec §11).

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::warn;

use crate::auth::{hash_api_key, Claims};
use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the operator JWT from the `Authorization` header.
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing or malformed authorization header"))?
        .to_string();

    let claims = state.auth_config.validate_token(&token)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Accepts `Authorization: Bearer <prefix>.<secret>` (spec §6.2) as an
/// alternative to an operator JWT for scripted/machine callers.
pub async fn api_key_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing or malformed authorization header"))?;

    let (prefix, secret) = presented
        .split_once('.')
        .ok_or_else(|| ApiError::unauthorized("malformed api key"))?;

    let record = state.store.api_keys.get_by_prefix(prefix).await?;

    if let Some(expiry) = record.expiration {
        if expiry < Utc::now() {
            return Err(ApiError::unauthorized("api key has expired"));
        }
    }

    if hash_api_key(secret) != record.key_hash {
        return Err(ApiError::unauthorized("invalid api key"));
    }

    let _ = state.store.api_keys.touch_last_seen(record.id, Utc::now()).await;

    let claims = Claims {
        sub: record.id.to_string(),
        username: format!("api-key:{prefix}"),
        role: "admin".to_string(),
        exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
        iat: Utc::now().timestamp(),
    };
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Require the `admin` role on the claims already attached by one of the
/// auth middlewares above.
pub async fn require_admin_middleware(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| ApiError::unauthorized("authentication required"))?;

    if claims.role != "admin" {
        warn!(user = %claims.username, role = %claims.role, "admin route denied");
        return Err(ApiError::forbidden("insufficient role permissions"));
    }
    Ok(next.run(request).await)
}
