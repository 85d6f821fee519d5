use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// How a node came to be registered, kept for audit and for the ephemeral-node
/// garbage collector (spec §11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationMethod {
    Interactive,
    PreAuthKey,
    Oidc,
}

impl RegistrationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationMethod::Interactive => "interactive",
            RegistrationMethod::PreAuthKey => "pre_auth_key",
            RegistrationMethod::Oidc => "oidc",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pre_auth_key" => RegistrationMethod::PreAuthKey,
            "oidc" => RegistrationMethod::Oidc,
            _ => RegistrationMethod::Interactive,
        }
    }
}

/// A node's self-reported host metadata, stored verbatim as JSON and echoed
/// back into peers' network maps.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostInfo {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, rename = "BackendState")]
    pub backend_state: String,
    #[serde(default, rename = "RequestTags")]
    pub request_tags: Vec<String>,
    #[serde(default, rename = "RoutableIPs")]
    pub routable_ips: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub machine_key: String,
    pub node_key: String,
    pub disco_key: String,
    pub namespace_id: Uuid,
    pub ipv4: String,
    pub ipv6: String,
    pub hostname: String,
    pub given_name: String,
    pub host_info: HostInfo,
    pub endpoints: Vec<Endpoint>,
    pub enabled_routes: Vec<String>,
    pub registration_method: RegistrationMethod,
    pub pre_auth_key_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_successful_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// A node is offline once it has missed the keep-alive window the long
    /// poll engine expects (spec §4.6 sweep).
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        match self.last_seen {
            Some(seen) => now - seen > timeout,
            None => true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now >= e).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreAuthKey {
    pub id: Uuid,
    pub key_secret: String,
    pub namespace_id: Uuid,
    pub reusable: bool,
    pub ephemeral: bool,
    pub used: bool,
    pub expiration: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PreAuthKey {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        if self.used && !self.reusable {
            return false;
        }
        match self.expiration {
            Some(exp) => now < exp,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub prefix: String,
    pub key_hash: String,
    pub expiration: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub node_id: i64,
    pub prefix: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// An admin REST operator account (spec §11 supplemented feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}
