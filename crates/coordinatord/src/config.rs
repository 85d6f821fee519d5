//! Server configuration, read from the environment at startup in the style
//! of `coord_store::DatabaseConfig::from_env` — no YAML loader is part of
//! this core (that surface is an external collaborator per the spec).

use std::net::IpAddr;
use std::time::Duration;

use ipnet::IpNet;

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub v4_prefix: IpNet,
    pub v6_prefix: IpNet,
}

#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub nameservers: Vec<IpAddr>,
    pub magic_dns: bool,
    pub base_domain: String,
}

#[derive(Debug, Clone)]
pub struct DerpMap {
    /// Opaque, forwarded verbatim to clients (spec §4.4): the core does not
    /// interpret DERP region contents.
    pub regions: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub registration_cache_ttl: Duration,
    pub keep_alive_interval: Duration,
    pub freshness_tick_interval: Duration,
    pub offline_sweep_interval: Duration,
    pub node_offline_after: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            registration_cache_ttl: Duration::from_secs(15 * 60),
            keep_alive_interval: Duration::from_secs(60),
            freshness_tick_interval: Duration::from_secs(30),
            offline_sweep_interval: Duration::from_secs(60),
            node_offline_after: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub overlay: OverlayConfig,
    pub dns: DnsConfig,
    pub derp: DerpMap,
    pub timing: TimingConfig,
    pub oidc_email_strip_domain: bool,
    pub server_url: String,
    pub acl_policy_path: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let v4_prefix: IpNet = std::env::var("OVERLAY_V4_PREFIX")
            .unwrap_or_else(|_| "100.64.0.0/10".to_string())
            .parse()?;
        let v6_prefix: IpNet = std::env::var("OVERLAY_V6_PREFIX")
            .unwrap_or_else(|_| "fd7a:115c:a1e0::/48".to_string())
            .parse()?;

        let nameservers = std::env::var("DNS_NAMESERVERS")
            .unwrap_or_else(|_| "1.1.1.1,8.8.8.8".to_string())
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim().parse())
            .collect::<Result<Vec<IpAddr>, _>>()?;

        let magic_dns = std::env::var("DNS_MAGIC_DNS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let base_domain = std::env::var("DNS_BASE_DOMAIN").unwrap_or_else(|_| "mesh.internal".to_string());

        let derp_regions = std::env::var("DERP_MAP_JSON")
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| serde_json::json!({ "regions": {} }));

        let server_url = std::env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

        let oidc_email_strip_domain = std::env::var("OIDC_STRIP_EMAIL_DOMAIN")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let acl_policy_path = std::env::var("ACL_POLICY_PATH").ok();

        Ok(Self {
            overlay: OverlayConfig { v4_prefix, v6_prefix },
            dns: DnsConfig { nameservers, magic_dns, base_domain },
            derp: DerpMap { regions: derp_regions },
            timing: TimingConfig::default(),
            oidc_email_strip_domain,
            server_url,
            acl_policy_path,
        })
    }
}
