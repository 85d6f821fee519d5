//! Admin JWT authentication for the operator REST surface (supplemented
//! feature; the node-facing registration protocol in `handlers::register`
//! uses the sealed wire codec instead, not JWTs).

use crate::error::{ApiError, ApiResult};
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Once;
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

const DEV_API_KEY_PEPPER: &str = "dev-api-key-pepper-change-me";
const MIN_PEPPER_LENGTH: usize = 32;
static API_KEY_PEPPER_WARNING: Once = Once::new();

fn warn_missing_pepper_once() {
    API_KEY_PEPPER_WARNING.call_once(|| {
        tracing::warn!(
            "API_KEY_PEPPER is not configured; using a development-only fallback pepper. \
             Set API_KEY_PEPPER (or AUTH_HASH_PEPPER) to silence this warning."
        );
    });
}

fn is_production_environment() -> bool {
    std::env::var("ENVIRONMENT")
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
        == "production"
}

fn pepper_is_weak(value: &str) -> bool {
    let normalized = value.to_lowercase();
    value.len() < MIN_PEPPER_LENGTH
        || normalized.contains("change-me")
        || normalized.contains("dev")
        || normalized.contains("test")
        || normalized.contains("local")
}

fn read_pepper(primary_var: &str) -> Option<String> {
    std::env::var(primary_var)
        .ok()
        .or_else(|| std::env::var("AUTH_HASH_PEPPER").ok())
}

fn resolve_api_key_pepper() -> String {
    if let Some(pepper) = read_pepper("API_KEY_PEPPER") {
        if is_production_environment() && pepper_is_weak(&pepper) {
            panic!(
                "PRODUCTION ERROR: API_KEY_PEPPER is weak. Configure it (or AUTH_HASH_PEPPER) with a strong random value (min {MIN_PEPPER_LENGTH} chars)."
            );
        }
        return pepper;
    }

    if is_production_environment() {
        panic!("PRODUCTION ERROR: API_KEY_PEPPER is not configured. Set API_KEY_PEPPER (or AUTH_HASH_PEPPER).");
    }

    warn_missing_pepper_once();
    DEV_API_KEY_PEPPER.to_string()
}

pub fn validate_hash_pepper_configuration() -> ApiResult<()> {
    if !is_production_environment() {
        return Ok(());
    }

    let api_key_pepper = read_pepper("API_KEY_PEPPER").ok_or_else(|| {
        ApiError::internal_error("PRODUCTION ERROR: API_KEY_PEPPER (or AUTH_HASH_PEPPER) must be configured.")
    })?;

    if pepper_is_weak(&api_key_pepper) {
        return Err(ApiError::internal_error(
            "PRODUCTION ERROR: API_KEY_PEPPER (or AUTH_HASH_PEPPER) is weak. Use a random secret with at least 32 characters.",
        ));
    }

    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: String, username: String, role: String, expiration_hours: i64) -> Self {
        let now = Utc::now();
        let expiration = now + Duration::hours(expiration_hours);
        Self {
            sub: user_id,
            username,
            role,
            exp: expiration.timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: String,
    pub jwt_expiration_hours: i64,
}

impl AuthConfig {
    pub fn from_env() -> ApiResult<Self> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| ApiError::internal_error("JWT_SECRET not configured"))?;

        let is_production = is_production_environment();

        if is_production
            && (jwt_secret == "your-jwt-secret-key-change-this-in-production"
                || jwt_secret.contains("dev")
                || jwt_secret.contains("local")
                || jwt_secret.contains("test")
                || jwt_secret.len() < 32)
        {
            return Err(ApiError::internal_error(
                "PRODUCTION ERROR: JWT_SECRET must be a secure random string (min 32 chars). Generate with: openssl rand -base64 32",
            ));
        }

        if !is_production
            && (jwt_secret == "your-jwt-secret-key-change-this-in-production" || jwt_secret.len() < 32)
        {
            tracing::warn!(
                "Using weak JWT_SECRET - only acceptable for development. Generate a secure one with: openssl rand -base64 32"
            );
        }

        let jwt_expiration_hours = std::env::var("JWT_EXPIRATION_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        Ok(Self { jwt_secret, jwt_expiration_hours })
    }

    pub fn generate_token(&self, user_id: String, username: String, role: String) -> ApiResult<String> {
        let claims = Claims::new(user_id, username, role, self.jwt_expiration_hours);
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.jwt_secret.as_bytes())).map_err(|e| {
            tracing::error!("Failed to generate JWT: {:?}", e);
            ApiError::internal_error("Failed to generate authentication token")
        })
    }

    pub fn validate_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(token, &DecodingKey::from_secret(self.jwt_secret.as_bytes()), &validation)?;
        Ok(token_data.claims)
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or_else(|| ApiError::unauthorized("Authentication required. Claims not found in request extensions."))?;

        Ok(AuthUser {
            user_id: claims.sub.clone(),
            username: claims.username.clone(),
            role: claims.role.clone(),
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.username.is_empty() || self.username.len() > 64 {
            return Err(ApiError::validation_error("Username must be 1-64 characters"));
        }
        if self.password.is_empty() || self.password.len() > 128 {
            return Err(ApiError::validation_error("Password must be 1-128 characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OperatorRegisterRequest {
    pub username: String,
    pub password: String,
}

impl OperatorRegisterRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.username.len() < 3 || self.username.len() > 32 {
            return Err(ApiError::validation_error("Username must be 3-32 characters"));
        }
        if !self.username.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(ApiError::validation_error(
                "Username can only contain letters, numbers, and underscores",
            ));
        }
        if self.password.len() < 8 {
            return Err(ApiError::validation_error("Password must be at least 8 characters"));
        }
        Ok(())
    }
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| {
        tracing::error!("Failed to hash password: {:?}", e);
        ApiError::internal_error("Failed to process password")
    })
}

pub fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
    bcrypt::verify(password, hash).map_err(|e| {
        tracing::error!("Failed to verify password: {:?}", e);
        ApiError::internal_error("Failed to verify password")
    })
}

pub async fn verify_password_async(password: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|_| ApiError::internal_error("Password verification task failed"))?
}

/// Generate a fresh API key, returned to the caller once: `<prefix>.<secret>`.
pub fn generate_api_key() -> (String, String) {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let prefix: String = (0..8).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect();
    let secret: String = (0..32).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect();
    (prefix, secret)
}

pub fn hash_api_key(secret: &str) -> String {
    let pepper = resolve_api_key_pepper();
    let mut mac = HmacSha256::new_from_slice(pepper.as_bytes()).expect("HMAC accepts keys of any size for SHA256");
    mac.update(secret.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_test_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, original }
        }

        fn remove(key: &'static str) -> Self {
            let original = std::env::var(key).ok();
            std::env::remove_var(key);
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.original {
                std::env::set_var(self.key, value);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }

    #[test]
    fn password_hashing_round_trips() {
        let password = "secure_password_123";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn api_key_generation_produces_distinct_prefix_and_secret() {
        let (prefix, secret) = generate_api_key();
        assert_eq!(prefix.len(), 8);
        assert_eq!(secret.len(), 32);
        assert_ne!(prefix, secret);
    }

    #[test]
    fn api_key_hash_is_stable_and_not_plaintext() {
        let _guard = env_test_lock().lock().unwrap();
        let _pepper = EnvVarGuard::set("API_KEY_PEPPER", "StrongApiKeyPepperValue1234567890ABCD!");
        let _environment = EnvVarGuard::set("ENVIRONMENT", "development");

        let h1 = hash_api_key("some-secret");
        let h2 = hash_api_key("some-secret");
        assert_eq!(h1, h2);
        assert_ne!(h1, "some-secret");
    }

    #[test]
    fn production_guard_rejects_missing_pepper() {
        let _guard = env_test_lock().lock().unwrap();
        let _environment = EnvVarGuard::set("ENVIRONMENT", "production");
        let _api = EnvVarGuard::remove("API_KEY_PEPPER");
        let _shared = EnvVarGuard::remove("AUTH_HASH_PEPPER");

        assert!(validate_hash_pepper_configuration().is_err());
    }

    #[test]
    fn production_guard_accepts_strong_shared_pepper() {
        let _guard = env_test_lock().lock().unwrap();
        let _environment = EnvVarGuard::set("ENVIRONMENT", "production");
        let _api = EnvVarGuard::remove("API_KEY_PEPPER");
        let _shared = EnvVarGuard::set("AUTH_HASH_PEPPER", "ThisIsAStrongSharedPepperValueForProd123!");

        assert!(validate_hash_pepper_configuration().is_ok());
    }
}
