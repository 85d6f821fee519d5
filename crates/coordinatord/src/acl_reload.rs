//! SIGHUP-triggered ACL policy reload (spec §6.3, §9 "ACL policy hot-swap").

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::state::AppState;

/// Listen for SIGHUP and reload the ACL policy file from `ACL_POLICY_PATH`
/// on each signal. A missing path or a failed compile leaves the
/// previously loaded policy in place; the process never exits because of
/// a bad reload.
pub fn spawn(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut stream = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(err) => {
                warn!(error = %err, "failed to install SIGHUP handler; ACL hot-reload disabled");
                return;
            }
        };

        loop {
            stream.recv().await;
            info!("SIGHUP received, reloading ACL policy");
            let Some(path) = state.config.acl_policy_path.clone() else {
                warn!("SIGHUP received but ACL_POLICY_PATH is not configured; ignoring");
                continue;
            };
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => match state.reload_acl(&raw).await {
                    Ok(()) => info!("ACL policy reloaded"),
                    Err(err) => warn!(error = %err.message, "ACL policy reload failed, keeping previous rules"),
                },
                Err(err) => warn!(path, error = %err, "failed to read ACL policy file"),
            }
        }
    });
}
