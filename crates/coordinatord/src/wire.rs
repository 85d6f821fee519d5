//! Wire DTOs exchanged with nodes, sealed with the authenticated codec in
//! `coord_crypto`. These mirror the client's existing on-wire shapes
//! (spec §6.1: "bit-exact to an existing client").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, Default, ToSchema)]
pub struct Hostinfo {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, rename = "RequestTags")]
    pub request_tags: Vec<String>,
    #[serde(default, rename = "RoutableIPs")]
    pub routable_ips: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Endpoint {
    pub addr: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthBlock {
    #[serde(default)]
    pub auth_key: Option<String>,
    #[serde(default)]
    pub oidc_id_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub node_key: String,
    #[serde(default)]
    pub old_node_key: Option<String>,
    #[serde(default)]
    pub hostinfo: Hostinfo,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auth: Option<AuthBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub machine_authorized: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MapRequest {
    pub node_key: String,
    #[serde(default)]
    pub hostinfo: Hostinfo,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub omit_peers: bool,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PeerInfo {
    pub node_key: String,
    pub disco_key: String,
    pub allowed_ips: Vec<String>,
    pub endpoints: Vec<Endpoint>,
    pub hostname: String,
    pub user: String,
    pub keep_alive: bool,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DnsConfigWire {
    pub nameservers: Vec<String>,
    pub magic_dns: bool,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FilterRuleWire {
    pub src_ips: Vec<String>,
    pub dst_ports: Vec<DestPortWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DestPortWire {
    pub ip: String,
    pub port_start: u16,
    pub port_end: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NodeBlock {
    pub node_key: String,
    pub allowed_ips: Vec<String>,
    pub hostname: String,
    pub given_name: String,
}

/// The per-node map response. `keep_alive_only` carries nothing but the
/// flag itself (spec §4.4's keep-alive variant).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MapResponse {
    pub keep_alive: bool,
    #[serde(default)]
    pub node: Option<NodeBlock>,
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
    #[serde(default)]
    pub dns: Option<DnsConfigWire>,
    #[serde(default)]
    pub derp_map: Option<serde_json::Value>,
    #[serde(default)]
    pub packet_filter: Vec<FilterRuleWire>,
    #[serde(default)]
    pub user_profiles: Vec<UserProfile>,
}

impl MapResponse {
    pub fn keep_alive_only() -> Self {
        Self {
            keep_alive: true,
            node: None,
            peers: Vec::new(),
            dns: None,
            derp_map: None,
            packet_filter: Vec::new(),
            user_profiles: Vec::new(),
        }
    }
}
