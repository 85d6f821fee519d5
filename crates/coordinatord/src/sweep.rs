//! Background sweep task (spec §11 supplemented feature), mirroring the
//! teacher's periodic `sweep_offline_nodes`/`sweep_connect_sessions` tasks
//! spawned from `main.rs`.
//!
//! Node "online" status is derived live from `last_seen` at map-assembly
//! time (see `assemble.rs`), so this sweep has nothing to flip there. Its
//! job is cleanup that nothing else does on its own: expired nodes, and
//! ephemeral nodes whose long-poll session ended without running
//! `SessionGuard`'s drop cleanup (process crash, killed connection).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Remove expired nodes and orphaned ephemeral nodes, returning how many
/// were removed. Namespaces that lost a node have their peers notified so
/// long-polling clients pick up the change on their next tick.
pub async fn sweep_once(state: &AppState) -> anyhow::Result<usize> {
    let now = Utc::now();
    let nodes = state.store.nodes.list_all().await?;

    let mut removed = 0usize;
    let mut touched_namespaces: HashSet<Uuid> = HashSet::new();

    for node in &nodes {
        let expired = node.is_expired(now);
        let orphaned_ephemeral = !expired
            && !state.broadcaster.is_registered(node.id)
            && node.is_stale(now, chrono::Duration::from_std(state.config.timing.node_offline_after).unwrap_or_default())
            && is_ephemeral(state, node.pre_auth_key_id).await;

        if expired || orphaned_ephemeral {
            if let Err(err) = state.store.nodes.delete(node.id).await {
                warn!(node_id = node.id, error = %err, "failed to remove node during sweep");
                continue;
            }
            removed += 1;
            touched_namespaces.insert(node.namespace_id);
        }
    }

    if removed > 0 {
        state.broadcaster.advance_epoch();
        for namespace_id in touched_namespaces {
            if let Ok(peers) = state.store.nodes.list_by_namespace(namespace_id).await {
                state.broadcaster.notify_many(peers.iter().map(|n| n.id));
            }
        }
    }

    state.registration_cache.sweep_expired();
    state.oidc_state_cache.sweep_expired();

    Ok(removed)
}

async fn is_ephemeral(state: &AppState, pre_auth_key_id: Option<Uuid>) -> bool {
    match pre_auth_key_id {
        Some(id) => state.store.pre_auth_keys.get_by_id(id).await.map(|k| k.ephemeral).unwrap_or(false),
        None => false,
    }
}

/// Spawn the periodic sweep loop. Mirrors the teacher's
/// `tokio::spawn` + `tokio::time::interval` shape in `main.rs`.
pub fn spawn(state: Arc<AppState>) {
    let interval = state.config.timing.offline_sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match sweep_once(&state).await {
                Ok(removed) if removed > 0 => info!(removed, "node sweep removed stale nodes"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "node sweep failed"),
            }
        }
    });
    info!("node sweep task started");
}
