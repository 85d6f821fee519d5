//! `GET /key` — the server's long-term public key, as a stable hex string
//! (spec §4.2, §6.1).

use std::sync::Arc;

use axum::extract::State;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/key",
    responses((status = 200, description = "Server long-term public key, hex-encoded", body = String))
)]
pub async fn get_key(State(state): State<Arc<AppState>>) -> String {
    state.server_keys.public_hex()
}
