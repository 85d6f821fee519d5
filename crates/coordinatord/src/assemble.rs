//! Map assembler (spec module I): builds the per-node map response from
//! the current node set, the compiled ACL rules, and static server
//! configuration (DNS, DERP).

use std::collections::HashSet;

use chrono::Utc;
use coord_acl::FilterRule;
use coord_store::models::Node;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::wire::{
    DestPortWire, DnsConfigWire, FilterRuleWire, MapResponse, NodeBlock, PeerInfo, UserProfile,
};

const ONLINE_WINDOW_SECS: i64 = 300;

fn node_ips(node: &Node) -> Vec<String> {
    vec![node.ipv4.clone(), node.ipv6.clone()]
}

/// Peers sharing N's namespace, plus any node referenced alongside N in a
/// filter rule (spec §4.4).
fn select_peers<'a>(me: &Node, all: &'a [Node], rules: &[FilterRule]) -> Vec<&'a Node> {
    let my_ips: HashSet<String> = node_ips(me).into_iter().collect();

    let mut acl_referenced: HashSet<String> = HashSet::new();
    for rule in rules {
        let mentions_me = rule.src_ips.iter().any(|ip| my_ips.contains(ip))
            || rule.dst_ports.iter().any(|d| my_ips.contains(&d.ip));
        if mentions_me {
            acl_referenced.extend(rule.src_ips.iter().cloned());
            acl_referenced.extend(rule.dst_ports.iter().map(|d| d.ip.clone()));
        }
    }

    all.iter()
        .filter(|n| n.id != me.id)
        .filter(|n| {
            n.namespace_id == me.namespace_id
                || node_ips(n).iter().any(|ip| acl_referenced.contains(ip))
        })
        .collect()
}

fn to_peer_info(node: &Node, now: chrono::DateTime<Utc>, namespace_name: &str) -> PeerInfo {
    let mut allowed_ips = node_ips(node);
    allowed_ips.extend(node.enabled_routes.iter().cloned());

    let online = node
        .last_seen
        .map(|seen| (now - seen).num_seconds() <= ONLINE_WINDOW_SECS)
        .unwrap_or(false);

    PeerInfo {
        node_key: node.node_key.clone(),
        disco_key: node.disco_key.clone(),
        allowed_ips,
        endpoints: node
            .endpoints
            .iter()
            .map(|e| crate::wire::Endpoint { addr: e.addr.clone(), port: e.port })
            .collect(),
        hostname: node.hostname.clone(),
        user: namespace_name.to_string(),
        keep_alive: true,
        online,
    }
}

/// Restrict the packet filter to rules where N's own IPs appear as a
/// source, so it only learns what it's permitted to originate. The
/// alternative — shipping the unrestricted list and letting the client
/// filter — is equally spec-compliant (§4.4); this core picks the
/// restricted form.
fn restrict_packet_filter(me: &Node, rules: &[FilterRule]) -> Vec<FilterRuleWire> {
    let my_ips: HashSet<String> = node_ips(me).into_iter().collect();
    rules
        .iter()
        .filter(|rule| rule.src_ips.iter().any(|ip| my_ips.contains(ip)))
        .map(|rule| FilterRuleWire {
            src_ips: rule.src_ips.clone(),
            dst_ports: rule
                .dst_ports
                .iter()
                .map(|d| DestPortWire {
                    ip: d.ip.clone(),
                    port_start: d.port_range.start,
                    port_end: d.port_range.end,
                })
                .collect(),
        })
        .collect()
}

pub async fn assemble_full_map(
    state: &AppState,
    node: &Node,
    request_options_keep_dns: bool,
) -> ApiResult<MapResponse> {
    let now = Utc::now();
    let all_nodes = state.store.nodes.list_all().await?;
    let live_nodes: Vec<Node> = all_nodes.into_iter().filter(|n| !n.is_expired(now)).collect();

    let rules = state.acl_rules.load_full();
    let peers_refs = select_peers(node, &live_nodes, &rules);

    let mut namespace_names = std::collections::HashMap::new();
    for peer in &peers_refs {
        if !namespace_names.contains_key(&peer.namespace_id) {
            if let Ok(ns) = state.store.namespaces.get_by_id(peer.namespace_id).await {
                namespace_names.insert(peer.namespace_id, ns.name);
            }
        }
    }

    let peers: Vec<PeerInfo> = peers_refs
        .iter()
        .map(|p| {
            let ns_name = namespace_names
                .get(&p.namespace_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            to_peer_info(p, now, &ns_name)
        })
        .collect();

    let mut user_profiles: Vec<UserProfile> = namespace_names
        .into_iter()
        .map(|(id, name)| UserProfile { id: id.to_string(), display_name: name })
        .collect();
    user_profiles.sort_by(|a, b| a.id.cmp(&b.id));

    let mut allowed_ips = node_ips(node);
    allowed_ips.extend(node.enabled_routes.iter().cloned());

    let node_block = NodeBlock {
        node_key: node.node_key.clone(),
        allowed_ips,
        hostname: node.hostname.clone(),
        given_name: node.given_name.clone(),
    };

    let dns = if request_options_keep_dns {
        Some(DnsConfigWire {
            nameservers: state.config.dns.nameservers.iter().map(|ip| ip.to_string()).collect(),
            magic_dns: state.config.dns.magic_dns,
            domains: vec![state.config.dns.base_domain.clone()],
        })
    } else {
        None
    };

    let derp_map = if request_options_keep_dns {
        Some(state.config.derp.regions.clone())
    } else {
        None
    };

    Ok(MapResponse {
        keep_alive: false,
        node: Some(node_block),
        peers,
        dns,
        derp_map,
        packet_filter: restrict_packet_filter(node, &rules),
        user_profiles,
    })
}

pub fn assemble_keep_alive() -> MapResponse {
    MapResponse::keep_alive_only()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use coord_store::models::{HostInfo, RegistrationMethod};
    use uuid::Uuid;

    fn make_node(id: i64, ns: Uuid, ipv4: &str, last_seen_secs_ago: Option<i64>) -> Node {
        Node {
            id,
            machine_key: format!("mkey:{id}"),
            node_key: format!("nkey:{id}"),
            disco_key: String::new(),
            namespace_id: ns,
            ipv4: ipv4.to_string(),
            ipv6: "fd7a::1".to_string(),
            hostname: format!("node{id}"),
            given_name: format!("node{id}"),
            host_info: HostInfo::default(),
            endpoints: vec![],
            enabled_routes: vec![],
            registration_method: RegistrationMethod::Interactive,
            pre_auth_key_id: None,
            expires_at: None,
            last_seen: last_seen_secs_ago.map(|s| Utc::now() - Duration::seconds(s)),
            last_successful_update: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn same_namespace_nodes_are_peers() {
        let ns = Uuid::new_v4();
        let me = make_node(1, ns, "100.64.0.1", None);
        let other_ns = Uuid::new_v4();
        let all = vec![
            me.clone(),
            make_node(2, ns, "100.64.0.2", None),
            make_node(3, other_ns, "100.64.0.3", None),
        ];
        let peers = select_peers(&me, &all, &[]);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, 2);
    }

    #[test]
    fn acl_referenced_peer_outside_namespace_is_included() {
        let ns = Uuid::new_v4();
        let other_ns = Uuid::new_v4();
        let me = make_node(1, ns, "100.64.0.1", None);
        let peer = make_node(2, other_ns, "100.64.0.2", None);
        let all = vec![me.clone(), peer];
        let rule = FilterRule {
            src_ips: vec!["100.64.0.1".to_string()],
            dst_ports: vec![coord_acl::DestPort {
                ip: "100.64.0.2".to_string(),
                port_range: coord_acl::PortRange { start: 22, end: 22 },
            }],
        };
        let peers = select_peers(&me, &all, std::slice::from_ref(&rule));
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, 2);
    }

    #[test]
    fn online_flag_reflects_five_minute_window() {
        let now = Utc::now();
        let recent = make_node(1, Uuid::new_v4(), "100.64.0.1", Some(30));
        let stale = make_node(2, Uuid::new_v4(), "100.64.0.2", Some(600));
        assert!(to_peer_info(&recent, now, "ns").online);
        assert!(!to_peer_info(&stale, now, "ns").online);
    }
}
