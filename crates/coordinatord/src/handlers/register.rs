//! `POST /machine/:machine_key/register` — the registration and
//! re-authentication state machine (spec module G, §4.2).

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
};
use chrono::Utc;
use coord_crypto::parse_public_key_hex;
use coord_store::models::RegistrationMethod;
use coord_store::NewNode;
use tracing::info;

use crate::cache::PendingRegistration;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::{AuthBlock, RegisterRequest, RegisterResponse};

/// Notify every node sharing a namespace that something about their peer
/// set changed. ACL-reachable peers outside the namespace catch up on
/// their next freshness tick regardless (they re-derive from the store).
async fn notify_namespace(state: &AppState, namespace_id: uuid::Uuid) {
    if let Ok(nodes) = state.store.nodes.list_by_namespace(namespace_id).await {
        state.broadcaster.advance_epoch();
        state.broadcaster.notify_many(nodes.iter().map(|n| n.id));
    }
}

#[utoipa::path(
    post,
    path = "/machine/{machine_key}/register",
    params(("machine_key" = String, Path, description = "Hex-encoded machine public key")),
    request_body = Vec<u8>,
    responses((status = 200, description = "Sealed RegisterResponse"))
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Path(machine_key_hex): Path<String>,
    body: Bytes,
) -> ApiResult<Vec<u8>> {
    let machine_public = parse_public_key_hex(&machine_key_hex).map_err(|_| ApiError::unknown_machine())?;
    let plaintext = state
        .server_keys
        .open(&machine_public, &body)
        .map_err(|_| ApiError::bad_seal())?;
    let req: RegisterRequest =
        serde_json::from_slice(&plaintext).map_err(|_| ApiError::bad_request("malformed register request"))?;

    let node_public = parse_public_key_hex(&req.node_key).map_err(|_| ApiError::bad_request("malformed node_key"))?;

    let response = match state.store.nodes.get_by_machine_key(&machine_key_hex).await {
        Ok(existing) if existing.node_key == req.node_key => refresh(&state, existing, &req).await?,
        Ok(existing) => rotate_or_reauth(&state, existing, &req, &machine_key_hex).await?,
        Err(coord_store::StoreError::NodeNotFound) => {
            new_registration(&state, &machine_key_hex, &req).await?
        }
        Err(err) => return Err(err.into()),
    };

    let payload = serde_json::to_vec(&response).expect("RegisterResponse always serializes");
    Ok(state.server_keys.seal(&node_public, &payload))
}

async fn refresh(
    state: &AppState,
    node: coord_store::models::Node,
    req: &RegisterRequest,
) -> ApiResult<RegisterResponse> {
    // A node may only shorten its own expiry, never extend past whatever an
    // admin previously set; an absent existing expiry imposes no ceiling.
    if let Some(expiry) = req.expiry {
        let shortens = node.expires_at.map(|current| expiry < current).unwrap_or(true);
        if shortens {
            state.store.nodes.expire_now(node.id, expiry).await?;
        }
    }
    state.store.nodes.touch_last_seen(node.id, Utc::now()).await?;
    let namespace = state.store.namespaces.get_by_id(node.namespace_id).await?;
    info!(node_id = node.id, "node refreshed");
    Ok(RegisterResponse {
        machine_authorized: true,
        user: Some(namespace.name),
        login: None,
        auth_url: None,
    })
}

async fn rotate_or_reauth(
    state: &AppState,
    node: coord_store::models::Node,
    req: &RegisterRequest,
    machine_key_hex: &str,
) -> ApiResult<RegisterResponse> {
    let old_matches = req
        .old_node_key
        .as_ref()
        .map(|old| old == &node.node_key)
        .unwrap_or(false);

    if old_matches {
        state.store.nodes.rotate_node_key(node.id, &req.node_key).await?;
        let namespace = state.store.namespaces.get_by_id(node.namespace_id).await?;
        info!(node_id = node.id, "node key rotated");
        return Ok(RegisterResponse {
            machine_authorized: true,
            user: Some(namespace.name),
            login: None,
            auth_url: None,
        });
    }

    // No matching OldNodeKey: require fresh authorization, same as a brand
    // new machine. An auth-key in the body re-binds; otherwise the caller
    // must wait in the pending-registration cache again.
    match req.auth.as_ref().and_then(|a| a.auth_key.clone()) {
        Some(secret) => {
            let key = authorize_pre_auth_key(state, &secret).await?;
            state.store.nodes.rotate_node_key(node.id, &req.node_key).await?;
            if !key.reusable {
                state.store.pre_auth_keys.mark_used(key.id).await?;
            }
            let namespace = state.store.namespaces.get_by_id(node.namespace_id).await?;
            info!(node_id = node.id, "node re-authorized and key rotated");
            Ok(RegisterResponse {
                machine_authorized: true,
                user: Some(namespace.name),
                login: None,
                auth_url: None,
            })
        }
        None => {
            let token = park_pending(state, machine_key_hex, &req.node_key);
            Ok(RegisterResponse {
                machine_authorized: false,
                user: None,
                login: None,
                auth_url: Some(format!("{}/register/{}", state.config.server_url, token)),
            })
        }
    }
}

async fn new_registration(
    state: &AppState,
    machine_key_hex: &str,
    req: &RegisterRequest,
) -> ApiResult<RegisterResponse> {
    match req.auth.as_ref().and_then(|a: &AuthBlock| a.auth_key.clone()) {
        Some(secret) => {
            let key = authorize_pre_auth_key(state, &secret).await?;

            let new_node = NewNode {
                machine_key: machine_key_hex,
                node_key: &req.node_key,
                namespace_id: key.namespace_id,
                hostname: &req.hostinfo.hostname,
                given_name: &req.hostinfo.hostname,
                registration_method: RegistrationMethod::PreAuthKey,
                pre_auth_key_id: Some(key.id),
                expires_at: req.expiry,
            };
            let node = state
                .store
                .nodes
                .create(new_node, &state.config.overlay.v4_prefix, &state.config.overlay.v6_prefix)
                .await?;

            if !key.reusable {
                state.store.pre_auth_keys.mark_used(key.id).await?;
            }

            let namespace = state.store.namespaces.get_by_id(node.namespace_id).await?;
            notify_namespace(state, node.namespace_id).await;
            info!(node_id = node.id, namespace = %namespace.name, "node registered via pre-auth key");

            Ok(RegisterResponse {
                machine_authorized: true,
                user: Some(namespace.name),
                login: None,
                auth_url: None,
            })
        }
        None => {
            let token = park_pending(state, machine_key_hex, &req.node_key);
            info!(machine_key = machine_key_hex, "machine parked pending authorization");
            Ok(RegisterResponse {
                machine_authorized: false,
                user: None,
                login: None,
                auth_url: Some(format!("{}/register/{}", state.config.server_url, token)),
            })
        }
    }
}

async fn authorize_pre_auth_key(state: &AppState, secret: &str) -> ApiResult<coord_store::models::PreAuthKey> {
    let key = state
        .store
        .pre_auth_keys
        .get_by_secret(secret)
        .await
        .map_err(|_| ApiError::invalid_auth_key())?;
    if !key.is_usable(Utc::now()) {
        return Err(ApiError::invalid_auth_key());
    }
    Ok(key)
}

fn park_pending(state: &AppState, machine_key_hex: &str, node_key: &str) -> String {
    let token = crate::cache::RegistrationCache::generate_token();
    state.registration_cache.put(
        token.clone(),
        PendingRegistration {
            machine_key: machine_key_hex.to_string(),
            node_key: node_key.to_string(),
            oidc_nonce: None,
        },
    );
    token
}
