//! Admin route approval (spec module D, spec §6.2): a node's reported
//! `routable_ips` are recorded as advertised-but-disabled routes
//! (`handlers::map::advertise_routes`); only an operator enabling one here
//! admits it into `enabled_routes`, the set clients actually see.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub node_id: i64,
    pub prefix: String,
}

#[derive(Debug, Serialize)]
pub struct RouteView {
    pub id: Uuid,
    pub node_id: i64,
    pub prefix: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<coord_store::models::Route> for RouteView {
    fn from(r: coord_store::models::Route) -> Self {
        Self { id: r.id, node_id: r.node_id, prefix: r.prefix, enabled: r.enabled, created_at: r.created_at }
    }
}

pub async fn advertise_route(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(req): Json<CreateRouteRequest>,
) -> ApiResult<(StatusCode, Json<RouteView>)> {
    let route = state.store.routes.advertise(req.node_id, &req.prefix).await?;
    Ok((StatusCode::CREATED, Json(route.into())))
}

pub async fn list_routes_for_node(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(node_id): Path<i64>,
) -> ApiResult<Json<Vec<RouteView>>> {
    let routes = state.store.routes.list_by_node(node_id).await?;
    Ok(Json(routes.into_iter().map(Into::into).collect()))
}

pub async fn enable_route(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    set_route_enabled(&state, id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disable_route(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    set_route_enabled(&state, id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Toggle a route and resync the owning node's `enabled_routes`, keeping
/// the `enabled_routes ⊆ advertised_routes` invariant true by construction:
/// the resynced list is always read back from the `routes` table itself.
async fn set_route_enabled(state: &AppState, id: Uuid, enabled: bool) -> ApiResult<()> {
    let route = state.store.routes.get_by_id(id).await?;
    state.store.routes.set_enabled(id, enabled).await?;
    let enabled_routes = state.store.routes.list_enabled_by_node(route.node_id).await?;
    let prefixes: Vec<String> = enabled_routes.into_iter().map(|r| r.prefix).collect();
    state.store.nodes.set_enabled_routes(route.node_id, &prefixes).await?;

    if let Ok(node) = state.store.nodes.get_by_id(route.node_id).await {
        if let Ok(peers) = state.store.nodes.list_by_namespace(node.namespace_id).await {
            state.broadcaster.advance_epoch();
            state.broadcaster.notify_many(peers.iter().map(|n| n.id));
        }
    }
    Ok(())
}

pub async fn delete_route(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let route = state.store.routes.get_by_id(id).await?;
    state.store.routes.delete(id).await?;
    let enabled_routes = state.store.routes.list_enabled_by_node(route.node_id).await?;
    let prefixes: Vec<String> = enabled_routes.into_iter().map(|r| r.prefix).collect();
    state.store.nodes.set_enabled_routes(route.node_id, &prefixes).await?;
    Ok(StatusCode::NO_CONTENT)
}
