//! Structured error handling with secure defaults
//!
//! This module provides comprehensive error types for the API with
//! security-focused error handling that prevents information leakage.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

/// API Error type with structured error information
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Error type identifier
    pub error: String,
    /// User-friendly error message
    pub message: String,
    /// HTTP status code
    #[serde(skip)]
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new API error
    pub fn new(
        error: impl Into<String>,
        message: impl Into<String>,
        status_code: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status_code,
        }
    }

    /// 400 Bad Request - Invalid request data
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message, StatusCode::BAD_REQUEST)
    }

    /// 401 Unauthorized - Authentication required
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message, StatusCode::UNAUTHORIZED)
    }

    /// 403 Forbidden - Insufficient permissions
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message, StatusCode::FORBIDDEN)
    }

    /// 404 Not Found - Resource doesn't exist
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message, StatusCode::NOT_FOUND)
    }

    /// 409 Conflict - Resource already exists
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message, StatusCode::CONFLICT)
    }

    /// 422 Unprocessable Entity - Validation error
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(
            "validation_error",
            message,
            StatusCode::UNPROCESSABLE_ENTITY,
        )
    }

    /// 429 Too Many Requests - Rate limit exceeded
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(
            "rate_limited",
            message,
            StatusCode::TOO_MANY_REQUESTS,
        )
    }

    /// 500 Internal Server Error - Generic server error
    /// NOTE: Use sparingly and avoid exposing internal details
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            "internal_error",
            message,
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    }

    /// 503 Service Unavailable - Service temporarily unavailable
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            "service_unavailable",
            message,
            StatusCode::SERVICE_UNAVAILABLE,
        )
    }

    // Registration-protocol error kinds (spec §7 "Auth" and "Fatal" classes).

    pub fn unknown_machine() -> Self {
        Self::new("unknown_machine", "machine_key is not recognized", StatusCode::BAD_REQUEST)
    }

    pub fn bad_seal() -> Self {
        Self::new("bad_seal", "failed to decrypt the sealed request body", StatusCode::UNAUTHORIZED)
    }

    pub fn invalid_auth_key() -> Self {
        Self::new("invalid_auth_key", "pre-auth key is unknown, expired, or already used", StatusCode::UNAUTHORIZED)
    }

    pub fn unauthorized_principal() -> Self {
        Self::new("unauthorized_principal", "caller is not authorized for this operation", StatusCode::UNAUTHORIZED)
    }

    pub fn no_addresses_available() -> Self {
        Self::new(
            "no_addresses_available",
            "the configured overlay prefixes have no free addresses",
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    }

    pub fn state_expired() -> Self {
        Self::new("state_expired", "the OIDC callback state has already been consumed", StatusCode::BAD_REQUEST)
    }
}

/// Convert ACL compilation failures to their spec-mandated tagged kinds.
/// Used at policy-load time; the caller retains the previously compiled
/// rule set rather than propagating this to an HTTP response.
impl From<coord_acl::AclError> for ApiError {
    fn from(err: coord_acl::AclError) -> Self {
        let kind = match &err {
            coord_acl::AclError::InvalidAction(_) => "invalid_action",
            coord_acl::AclError::InvalidUserSection(_) => "invalid_user_section",
            coord_acl::AclError::InvalidGroup(_) => "invalid_group",
            coord_acl::AclError::InvalidTag(_) => "invalid_tag",
            coord_acl::AclError::InvalidNamespace(_) => "invalid_namespace",
            coord_acl::AclError::InvalidPortFormat(_) => "invalid_port_format",
            coord_acl::AclError::EmptyPolicy => "empty_policy",
            coord_acl::AclError::Parse(_) => "empty_policy",
        };
        Self::new(kind, err.to_string(), StatusCode::BAD_REQUEST)
    }
}

impl From<coord_store::StoreError> for ApiError {
    fn from(err: coord_store::StoreError) -> Self {
        match err {
            coord_store::StoreError::NamespaceNotFound => Self::not_found("namespace not found"),
            coord_store::StoreError::NodeNotFound => Self::not_found("node not found"),
            coord_store::StoreError::PreAuthKeyNotFound => Self::invalid_auth_key(),
            coord_store::StoreError::ApiKeyNotFound => Self::unauthorized("unknown api key"),
            coord_store::StoreError::RouteNotFound => Self::not_found("route not found"),
            coord_store::StoreError::OperatorNotFound => Self::unauthorized("invalid username or password"),
            coord_store::StoreError::NoAddressesAvailable => Self::no_addresses_available(),
            coord_store::StoreError::InvalidNamespaceName(name) => {
                Self::new("invalid_namespace", format!("invalid namespace name: {name}"), StatusCode::BAD_REQUEST)
            }
            coord_store::StoreError::Database(e) => ApiError::from(e),
        }
    }
}

impl From<coord_crypto::CryptoError> for ApiError {
    fn from(_err: coord_crypto::CryptoError) -> Self {
        Self::bad_seal()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code;
        (status, Json(self)).into_response()
    }
}

/// Convert anyhow errors to API errors with safe error handling
/// This prevents internal error details from leaking to users
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Log the full error internally for debugging
        tracing::error!("Internal error: {:?}", err);
        
        // Return a sanitized error to the user
        ApiError::internal_error("An internal error occurred. Please try again later.")
    }
}

/// Convert sqlx errors to API errors with safe error handling
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Database error: {:?}", err);
        
        match err {
            sqlx::Error::RowNotFound => {
                ApiError::not_found("The requested resource was not found")
            }
            sqlx::Error::Database(db_err) => {
                // Check for constraint violations (e.g., unique constraint)
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("unique") || constraint.contains("pkey") {
                        return ApiError::conflict("A resource with this identifier already exists");
                    }
                }
                
                // For other database errors, return a generic message
                ApiError::internal_error("A database error occurred. Please try again later.")
            }
            sqlx::Error::PoolTimedOut => {
                ApiError::service_unavailable("The service is temporarily unavailable. Please try again later.")
            }
            _ => {
                // For all other database errors, return a generic message
                ApiError::internal_error("A database error occurred. Please try again later.")
            }
        }
    }
}

/// Convert JWT errors to API errors
impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        // Log the error for debugging
        tracing::warn!("JWT error: {:?}", err);
        
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ApiError::unauthorized("Your session has expired. Please log in again.")
            }
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                ApiError::unauthorized("Invalid authentication token")
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::unauthorized("Invalid authentication token")
            }
            _ => {
                ApiError::unauthorized("Authentication failed")
            }
        }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
