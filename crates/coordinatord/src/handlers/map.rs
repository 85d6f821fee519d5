//! `POST /machine/:machine_key/map` — the network-map long-poll engine
//! (spec module H, §4.5).
//!
//! Frames are streamed as `u32` big-endian length prefix + NaCl-sealed
//! JSON body; the spec does not mandate a framing beyond "sealed frames"
//! so this core picks a fixed length-prefix scheme, documented here rather
//! than left implicit.

use std::io;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use coord_crypto::{parse_public_key_hex, NodePublicKey};
use coord_store::models::{Endpoint as StoreEndpoint, HostInfo as StoreHostInfo, Node};
use tokio_stream::Stream;
use tracing::info;

use crate::assemble::{assemble_full_map, assemble_keep_alive};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::wire::{Endpoint as WireEndpoint, Hostinfo as WireHostinfo, MapRequest, MapResponse};

fn frame(payload: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Bytes::from(out)
}

fn seal_frame(state: &AppState, node_public: &NodePublicKey, response: &MapResponse) -> Bytes {
    let payload = serde_json::to_vec(response).expect("MapResponse always serializes");
    frame(&state.server_keys.seal(node_public, &payload))
}

fn to_store_host_info(h: &WireHostinfo) -> StoreHostInfo {
    StoreHostInfo {
        os: h.os.clone(),
        hostname: h.hostname.clone(),
        backend_state: String::new(),
        request_tags: h.request_tags.clone(),
        routable_ips: h.routable_ips.clone(),
    }
}

fn to_store_endpoints(endpoints: &[WireEndpoint]) -> Vec<StoreEndpoint> {
    endpoints.iter().map(|e| StoreEndpoint { addr: e.addr.clone(), port: e.port }).collect()
}

/// Record every prefix a node currently advertises so an admin can later
/// enable it (spec §4.2/§6.2 route approval). Advertising is an upsert, not
/// an enable: a freshly reported prefix starts disabled until approved.
async fn advertise_routes(state: &AppState, node_id: i64, routable_ips: &[String]) {
    for prefix in routable_ips {
        if let Err(err) = state.store.routes.advertise(node_id, prefix).await {
            tracing::warn!(node_id, prefix = %prefix, error = %err, "failed to record advertised route");
        }
    }
}

async fn notify_namespace_peers(state: &AppState, node: &Node) {
    if let Ok(nodes) = state.store.nodes.list_by_namespace(node.namespace_id).await {
        state.broadcaster.advance_epoch();
        state
            .broadcaster
            .notify_many(nodes.iter().filter(|n| n.id != node.id).map(|n| n.id));
    }
}

#[utoipa::path(
    post,
    path = "/machine/{machine_key}/map",
    params(("machine_key" = String, Path, description = "Hex-encoded machine public key")),
    request_body = Vec<u8>,
    responses((status = 200, description = "Sealed MapResponse, possibly streamed as length-prefixed frames"))
)]
pub async fn map_session(
    State(state): State<Arc<AppState>>,
    Path(machine_key_hex): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let machine_public = parse_public_key_hex(&machine_key_hex).map_err(|_| ApiError::unknown_machine())?;
    let plaintext = state
        .server_keys
        .open(&machine_public, &body)
        .map_err(|_| ApiError::bad_seal())?;
    let req: MapRequest =
        serde_json::from_slice(&plaintext).map_err(|_| ApiError::bad_request("malformed map request"))?;

    let node = state
        .store
        .nodes
        .get_by_machine_key(&machine_key_hex)
        .await
        .map_err(|_| ApiError::unauthorized_principal())?;
    let node_public = parse_public_key_hex(&node.node_key).map_err(|_| ApiError::bad_seal())?;

    state
        .store
        .nodes
        .update_host_info(node.id, &to_store_host_info(&req.hostinfo), &to_store_endpoints(&req.endpoints))
        .await?;
    state.store.nodes.touch_last_seen(node.id, Utc::now()).await?;
    advertise_routes(&state, node.id, &req.hostinfo.routable_ips).await;

    let initial_map = assemble_full_map(&state, &node, true).await?;
    state.store.nodes.mark_update_delivered(node.id, Utc::now()).await?;

    if req.read_only {
        return Ok(seal_frame(&state, &node_public, &initial_map).into_response());
    }

    if req.omit_peers && !req.stream {
        let out = seal_frame(&state, &node_public, &initial_map);
        notify_namespace_peers(&state, &node).await;
        return Ok(out.into_response());
    }

    info!(node_id = node.id, "map stream opened");
    let stream = build_stream(state, node, node_public, initial_map);
    Ok(Response::builder()
        .header("content-type", "application/octet-stream")
        .body(Body::from_stream(stream))
        .expect("static response parts are always valid"))
}

/// Spawns a best-effort cleanup task when the stream's generator future is
/// dropped (client disconnect or write error), matching spec §4.5's
/// disconnect behavior: release the update channel, stamp `last_seen`, and
/// garbage-collect the node if it was registered with an ephemeral key.
struct SessionGuard {
    state: Arc<AppState>,
    node_id: i64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let state = self.state.clone();
        let node_id = self.node_id;
        tokio::spawn(async move {
            state.broadcaster.unregister(node_id);
            let _ = state.store.nodes.touch_last_seen(node_id, Utc::now()).await;

            if let Ok(node) = state.store.nodes.get_by_id(node_id).await {
                if let Some(key_id) = node.pre_auth_key_id {
                    let ephemeral = state
                        .store
                        .pre_auth_keys
                        .get_by_id(key_id)
                        .await
                        .map(|k| k.ephemeral)
                        .unwrap_or(false);
                    if ephemeral {
                        let _ = state.store.nodes.delete(node_id).await;
                    }
                }
            }
        });
    }
}

async fn reassemble_if_outdated(
    state: &AppState,
    node_id: i64,
    node_public: &NodePublicKey,
) -> Option<Bytes> {
    let node = state.store.nodes.get_by_id(node_id).await.ok()?;
    let epoch_ms = state.broadcaster.current_epoch();
    let last_update_ms = node.last_successful_update.map(|t| t.timestamp_millis()).unwrap_or(0);
    if last_update_ms >= epoch_ms {
        return None;
    }
    let map = assemble_full_map(state, &node, true).await.ok()?;
    let _ = state.store.nodes.mark_update_delivered(node_id, Utc::now()).await;
    Some(seal_frame(state, node_public, &map))
}

fn build_stream(
    state: Arc<AppState>,
    node: Node,
    node_public: NodePublicKey,
    initial_map: MapResponse,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    async_stream::stream! {
        let node_id = node.id;
        let mut rx = state.broadcaster.register(node_id);
        let _guard = SessionGuard { state: state.clone(), node_id };

        let mut keep_alive_ticker = tokio::time::interval(state.config.timing.keep_alive_interval);
        let mut freshness_ticker = tokio::time::interval(state.config.timing.freshness_tick_interval);
        keep_alive_ticker.tick().await;
        freshness_ticker.tick().await;

        yield Ok(seal_frame(&state, &node_public, &initial_map));

        loop {
            tokio::select! {
                _ = keep_alive_ticker.tick() => {
                    let _ = state.store.nodes.touch_last_seen(node_id, Utc::now()).await;
                    yield Ok(seal_frame(&state, &node_public, &assemble_keep_alive()));
                }
                _ = freshness_ticker.tick() => {
                    if let Some(bytes) = reassemble_if_outdated(&state, node_id, &node_public).await {
                        yield Ok(bytes);
                    }
                }
                signal = rx.recv() => {
                    if signal.is_none() {
                        break;
                    }
                    if let Some(bytes) = reassemble_if_outdated(&state, node_id, &node_public).await {
                        yield Ok(bytes);
                    }
                }
            }
        }
    }
}
