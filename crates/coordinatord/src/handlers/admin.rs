//! JWT-protected operator REST surface (spec §11 supplemented feature):
//! the equivalent of the admin gRPC API spec §6.2 places out of scope,
//! exposed here as plain REST since this core has no gRPC transport.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{self, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNamespaceRequest {
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NamespaceView {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<coord_store::models::Namespace> for NamespaceView {
    fn from(n: coord_store::models::Namespace) -> Self {
        Self { id: n.id, name: n.name, created_at: n.created_at }
    }
}

#[utoipa::path(
    post,
    path = "/admin/namespaces",
    request_body = CreateNamespaceRequest,
    responses((status = 201, description = "Namespace created", body = NamespaceView)),
    security(("bearer_auth" = []))
)]
pub async fn create_namespace(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(req): Json<CreateNamespaceRequest>,
) -> ApiResult<(StatusCode, Json<NamespaceView>)> {
    let ns = state.store.namespaces.create(&req.name).await?;
    info!(namespace = %ns.name, "namespace created");
    Ok((StatusCode::CREATED, Json(ns.into())))
}

#[utoipa::path(
    get,
    path = "/admin/namespaces",
    responses((status = 200, description = "All namespaces", body = Vec<NamespaceView>)),
    security(("bearer_auth" = []))
)]
pub async fn list_namespaces(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
) -> ApiResult<Json<Vec<NamespaceView>>> {
    let namespaces = state.store.namespaces.list().await?;
    Ok(Json(namespaces.into_iter().map(Into::into).collect()))
}

pub async fn delete_namespace(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.namespaces.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePreAuthKeyRequest {
    pub namespace_id: Uuid,
    #[serde(default)]
    pub reusable: bool,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PreAuthKeyView {
    pub id: Uuid,
    pub key_secret: String,
    pub namespace_id: Uuid,
    pub reusable: bool,
    pub ephemeral: bool,
    pub used: bool,
    pub expiration: Option<DateTime<Utc>>,
}

impl From<coord_store::models::PreAuthKey> for PreAuthKeyView {
    fn from(k: coord_store::models::PreAuthKey) -> Self {
        Self {
            id: k.id,
            key_secret: k.key_secret,
            namespace_id: k.namespace_id,
            reusable: k.reusable,
            ephemeral: k.ephemeral,
            used: k.used,
            expiration: k.expiration,
        }
    }
}

pub async fn create_pre_auth_key(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(req): Json<CreatePreAuthKeyRequest>,
) -> ApiResult<(StatusCode, Json<PreAuthKeyView>)> {
    let key = state
        .store
        .pre_auth_keys
        .create(req.namespace_id, req.reusable, req.ephemeral, req.expiration)
        .await?;
    Ok((StatusCode::CREATED, Json(key.into())))
}

pub async fn list_pre_auth_keys(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(namespace_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PreAuthKeyView>>> {
    let keys = state.store.pre_auth_keys.list_by_namespace(namespace_id).await?;
    Ok(Json(keys.into_iter().map(Into::into).collect()))
}

pub async fn expire_pre_auth_key(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.pre_auth_keys.expire(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NodeView {
    pub id: i64,
    pub machine_key: String,
    pub node_key: String,
    pub namespace_id: Uuid,
    pub hostname: String,
    pub ipv4: String,
    pub ipv6: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<coord_store::models::Node> for NodeView {
    fn from(n: coord_store::models::Node) -> Self {
        Self {
            id: n.id,
            machine_key: n.machine_key,
            node_key: n.node_key,
            namespace_id: n.namespace_id,
            hostname: n.hostname,
            ipv4: n.ipv4,
            ipv6: n.ipv6,
            last_seen: n.last_seen,
            expires_at: n.expires_at,
        }
    }
}

pub async fn list_nodes(State(state): State<Arc<AppState>>, _auth: AuthUser) -> ApiResult<Json<Vec<NodeView>>> {
    let nodes = state.store.nodes.list_all().await?;
    Ok(Json(nodes.into_iter().map(Into::into).collect()))
}

pub async fn delete_node(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let node = state.store.nodes.get_by_id(id).await?;
    state.store.nodes.delete(id).await?;
    if let Ok(peers) = state.store.nodes.list_by_namespace(node.namespace_id).await {
        state.broadcaster.advance_epoch();
        state.broadcaster.notify_many(peers.iter().map(|n| n.id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssueApiKeyResponse {
    pub prefix: String,
    pub secret: String,
}

pub async fn issue_api_key(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
) -> ApiResult<(StatusCode, Json<IssueApiKeyResponse>)> {
    let (prefix, secret) = auth::generate_api_key();
    let hash = auth::hash_api_key(&secret);
    state.store.api_keys.create(&prefix, &hash, None).await?;
    Ok((StatusCode::CREATED, Json(IssueApiKeyResponse { prefix, secret })))
}

pub async fn reload_acl(State(state): State<Arc<AppState>>, _auth: AuthUser) -> ApiResult<StatusCode> {
    let path = state
        .config
        .acl_policy_path
        .clone()
        .ok_or_else(|| ApiError::bad_request("ACL_POLICY_PATH is not configured"))?;
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| ApiError::internal_error(format!("failed to read ACL policy file: {e}")))?;
    state.reload_acl(&raw).await?;
    info!("ACL policy reloaded via admin endpoint");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/admin/register",
    request_body = auth::OperatorRegisterRequest,
    responses((status = 201, description = "Operator account created"))
)]
pub async fn register_operator(
    State(state): State<Arc<AppState>>,
    Json(req): Json<auth::OperatorRegisterRequest>,
) -> ApiResult<StatusCode> {
    req.validate()?;
    let password_hash = auth::hash_password(&req.password)?;
    state.store.operators.create(&req.username, &password_hash).await?;
    info!(username = %req.username, "operator account created");
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/admin/login",
    request_body = auth::LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = auth::LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<auth::LoginRequest>,
) -> ApiResult<Json<auth::LoginResponse>> {
    req.validate()?;
    let operator = state.store.operators.get_by_username(&req.username).await?;
    let valid = auth::verify_password_async(req.password.clone(), operator.password_hash.clone()).await?;
    if !valid {
        return Err(ApiError::unauthorized("invalid username or password"));
    }
    let _ = state.store.operators.touch_last_login(operator.id, Utc::now()).await;
    let token = state
        .auth_config
        .generate_token(operator.id.to_string(), operator.username.clone(), operator.role.clone())?;
    info!(username = %operator.username, "operator logged in");
    Ok(Json(auth::LoginResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: state.auth_config.jwt_expiration_hours * 3600,
    }))
}
