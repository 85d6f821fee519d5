//! OIDC hand-off contract (spec §4.2, §6.1, §11): the browser-redirect
//! dance to the IdP itself is out of scope, but starting it from a parked
//! registration and consuming the callback to finish that registration is
//! this core's job.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use openidconnect::{
    core::CoreResponseType, reqwest::async_http_client, AuthenticationFlow, AuthorizationCode, CsrfToken, Nonce,
    OAuth2TokenResponse, Scope, TokenResponse,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cache::PendingRegistration;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(machine_key_hex): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let client = state
        .oidc_client
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("OIDC is not configured on this server"))?;

    let pending = state
        .registration_cache
        .find_by_machine_key(&machine_key_hex)
        .ok_or_else(|| ApiError::bad_request("no pending registration for this machine"))?;

    let (auth_url, csrf_token, nonce) = client
        .authorize_url(AuthenticationFlow::<CoreResponseType>::AuthorizationCode, CsrfToken::new_random, Nonce::new_random)
        .add_scope(Scope::new("email".to_string()))
        .add_scope(Scope::new("profile".to_string()))
        .url();

    state.oidc_state_cache.put_with_ttl(
        csrf_token.secret().clone(),
        PendingRegistration {
            machine_key: pending.machine_key,
            node_key: pending.node_key,
            oidc_nonce: Some(nonce.secret().clone()),
        },
        std::time::Duration::from_secs(10 * 60),
    );

    info!(machine_key = %machine_key_hex, "OIDC flow started");
    Ok(Redirect::to(auth_url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: String,
    pub code: String,
}

pub async fn callback(State(state): State<Arc<AppState>>, Query(params): Query<CallbackParams>) -> ApiResult<String> {
    let client = state
        .oidc_client
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("OIDC is not configured on this server"))?;

    let pending = state.oidc_state_cache.get(&params.state).ok_or_else(ApiError::state_expired)?;
    state.oidc_state_cache.remove(&params.state);
    let nonce_secret = pending.oidc_nonce.clone().ok_or_else(ApiError::state_expired)?;
    let nonce = openidconnect::Nonce::new(nonce_secret);

    let token_response = client
        .exchange_code(AuthorizationCode::new(params.code))
        .request_async(async_http_client)
        .await
        .map_err(|e| {
            warn!(error = %e, "OIDC code exchange failed");
            ApiError::unauthorized("failed to exchange authorization code with the identity provider")
        })?;

    let id_token = token_response
        .id_token()
        .ok_or_else(|| ApiError::unauthorized("identity provider did not return an ID token"))?;
    let claims = id_token
        .claims(&client.id_token_verifier(), &nonce)
        .map_err(|_| ApiError::unauthorized("ID token failed verification"))?;

    let email = claims
        .email()
        .map(|e| e.to_string())
        .ok_or_else(|| ApiError::unauthorized("identity provider did not supply an email claim"))?;

    let namespace_name = derive_namespace_name(&email, state.config.oidc_email_strip_domain);

    let namespace = match state.store.namespaces.get_by_name(&namespace_name).await {
        Ok(ns) => ns,
        Err(coord_store::StoreError::NamespaceNotFound) => state.store.namespaces.create(&namespace_name).await?,
        Err(err) => return Err(err.into()),
    };

    let new_node = coord_store::NewNode {
        machine_key: &pending.machine_key,
        node_key: &pending.node_key,
        namespace_id: namespace.id,
        hostname: &namespace_name,
        given_name: &namespace_name,
        registration_method: coord_store::models::RegistrationMethod::Oidc,
        pre_auth_key_id: None,
        expires_at: None,
    };
    let node = state
        .store
        .nodes
        .create(new_node, &state.config.overlay.v4_prefix, &state.config.overlay.v6_prefix)
        .await?;

    if let Ok(peers) = state.store.nodes.list_by_namespace(namespace.id).await {
        state.broadcaster.advance_epoch();
        state.broadcaster.notify_many(peers.iter().map(|n| n.id));
    }

    info!(node_id = node.id, namespace = %namespace.name, "node registered via OIDC");
    Ok(format!("Registration complete. You may close this window and return to {}.", namespace.name))
}

fn derive_namespace_name(email: &str, strip_domain: bool) -> String {
    if strip_domain {
        email.split('@').next().unwrap_or(email).to_string()
    } else {
        email.replace('@', ".")
    }
}
