use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::AclError;
use crate::node_view::NodeView;
use crate::policy::Policy;
use crate::portspec::{parse_dest_token, PortRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestPort {
    pub ip: String,
    pub port_range: PortRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub src_ips: Vec<String>,
    pub dst_ports: Vec<DestPort>,
}

/// Expand a user/host alias into the concrete IP/CIDR literals it denotes,
/// per the seven-step resolution order in spec §4.3.
fn expand_alias(alias: &str, policy: &Policy, nodes: &[NodeView]) -> Result<Vec<String>, AclError> {
    if alias == "*" {
        return Ok(vec!["*".to_string()]);
    }

    if let Some(group_name) = alias.strip_prefix("group:") {
        let members = policy
            .groups
            .get(group_name)
            .ok_or_else(|| AclError::InvalidGroup(alias.to_string()))?;
        let mut ips = Vec::new();
        for namespace in members {
            if policy.groups.contains_key(namespace) {
                return Err(AclError::InvalidGroup(namespace.clone()));
            }
            collect_namespace_ips(namespace, nodes, &mut ips);
        }
        return Ok(ips);
    }

    if alias.starts_with("tag:") {
        let owners = policy
            .tag_owners
            .get(alias)
            .ok_or_else(|| AclError::InvalidTag(alias.to_string()))?;
        let mut owner_namespaces = Vec::new();
        for owner in owners {
            if let Some(group_name) = owner.strip_prefix("group:") {
                if let Some(members) = policy.groups.get(group_name) {
                    owner_namespaces.extend(members.iter().cloned());
                } else {
                    return Err(AclError::InvalidGroup(owner.clone()));
                }
            } else {
                owner_namespaces.push(owner.clone());
            }
        }
        let mut ips = Vec::new();
        for node in nodes {
            if owner_namespaces.iter().any(|ns| ns == &node.namespace)
                && node.request_tags.iter().any(|t| t == alias)
            {
                for ip in &node.ips {
                    push_unique(&mut ips, ip.clone());
                }
            }
        }
        return Ok(ips);
    }

    if nodes.iter().any(|n| n.namespace == alias) {
        let mut ips = Vec::new();
        collect_namespace_ips(alias, nodes, &mut ips);
        return Ok(ips);
    }

    if let Some(literal) = policy.hosts.get(alias) {
        return Ok(vec![literal.clone()]);
    }

    if alias.parse::<IpAddr>().is_ok() {
        return Ok(vec![alias.to_string()]);
    }

    if alias.parse::<IpNet>().is_ok() {
        return Ok(vec![alias.to_string()]);
    }

    Err(AclError::InvalidUserSection(alias.to_string()))
}

fn collect_namespace_ips(namespace: &str, nodes: &[NodeView], out: &mut Vec<String>) {
    for node in nodes {
        if node.namespace == namespace {
            for ip in &node.ips {
                push_unique(out, ip.clone());
            }
        }
    }
}

fn push_unique(ips: &mut Vec<String>, ip: String) {
    if !ips.contains(&ip) {
        ips.push(ip);
    }
}

/// Compile a policy document against the current node set into the ordered
/// list of filter rules the map assembler attaches to outgoing maps.
///
/// Deterministic for a given `(policy, nodes)` pair: iteration only ever
/// walks `policy.acls` and `nodes`, both caller-ordered slices, never a
/// hash-map in full.
pub fn compile(policy: &Policy, nodes: &[NodeView]) -> Result<Vec<FilterRule>, AclError> {
    let mut rules = Vec::with_capacity(policy.acls.len());

    for entry in &policy.acls {
        if entry.action != "accept" {
            return Err(AclError::InvalidAction(entry.action.clone()));
        }

        let mut src_ips = Vec::new();
        for user in &entry.users {
            for ip in expand_alias(user, policy, nodes)? {
                push_unique(&mut src_ips, ip);
            }
        }

        let mut dst_ports = Vec::new();
        for port_token in &entry.ports {
            let (host_alias, ranges) = parse_dest_token(port_token)?;
            let dest_ips = expand_alias(&host_alias, policy, nodes)?;
            for ip in dest_ips {
                for range in &ranges {
                    dst_ports.push(DestPort {
                        ip: ip.clone(),
                        port_range: *range,
                    });
                }
            }
        }

        rules.push(FilterRule { src_ips, dst_ports });
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AclEntry;
    use std::collections::HashMap;

    fn node(namespace: &str, ip: &str, tags: &[&str]) -> NodeView {
        NodeView::new(
            namespace,
            vec![ip.to_string()],
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn s3_group_accept_compiles_single_rule() {
        let mut groups = HashMap::new();
        groups.insert("admins".to_string(), vec!["alice".to_string()]);
        let policy = Policy {
            groups,
            acls: vec![AclEntry {
                action: "accept".into(),
                users: vec!["group:admins".into()],
                ports: vec!["*:22".into()],
            }],
            ..Default::default()
        };
        let nodes = vec![
            node("alice", "100.64.0.1", &[]),
            node("bob", "100.64.0.2", &[]),
        ];

        let rules = compile(&policy, &nodes).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].src_ips, vec!["100.64.0.1".to_string()]);
        assert_eq!(
            rules[0].dst_ports,
            vec![DestPort {
                ip: "*".into(),
                port_range: PortRange { start: 22, end: 22 },
            }]
        );
    }

    #[test]
    fn s3_reject_action_is_invalid() {
        let policy = Policy {
            acls: vec![AclEntry {
                action: "reject".into(),
                users: vec!["*".into()],
                ports: vec!["*:22".into()],
            }],
            ..Default::default()
        };
        assert!(matches!(
            compile(&policy, &[]),
            Err(AclError::InvalidAction(_))
        ));
    }

    #[test]
    fn s4_tag_expansion_is_owner_gated() {
        let mut tag_owners = HashMap::new();
        tag_owners.insert("tag:web".to_string(), vec!["alice".to_string()]);
        let policy = Policy {
            tag_owners,
            acls: vec![AclEntry {
                action: "accept".into(),
                users: vec!["tag:web".into()],
                ports: vec!["*:*".into()],
            }],
            ..Default::default()
        };
        let nodes = vec![
            node("alice", "100.64.0.3", &["tag:web"]),
            node("bob", "100.64.0.4", &["tag:web"]),
        ];

        let rules = compile(&policy, &nodes).unwrap();
        assert_eq!(rules[0].src_ips, vec!["100.64.0.3".to_string()]);
    }

    #[test]
    fn missing_tag_owner_is_invalid_tag() {
        let policy = Policy {
            acls: vec![AclEntry {
                action: "accept".into(),
                users: vec!["tag:unclaimed".into()],
                ports: vec!["*:*".into()],
            }],
            ..Default::default()
        };
        assert!(matches!(
            compile(&policy, &[]),
            Err(AclError::InvalidTag(_))
        ));
    }

    #[test]
    fn s5_port_spec_expands_multiple_ranges() {
        let policy = Policy {
            acls: vec![AclEntry {
                action: "accept".into(),
                users: vec!["*".into()],
                ports: vec!["10.0.0.0/8:80,443,8000-8100".into()],
            }],
            ..Default::default()
        };
        let rules = compile(&policy, &[]).unwrap();
        assert_eq!(rules[0].dst_ports.len(), 3);
        assert_eq!(rules[0].dst_ports[2].port_range, PortRange { start: 8000, end: 8100 });
    }

    #[test]
    fn compile_is_deterministic() {
        let mut groups = HashMap::new();
        groups.insert("admins".to_string(), vec!["alice".to_string()]);
        let policy = Policy {
            groups,
            acls: vec![AclEntry {
                action: "accept".into(),
                users: vec!["group:admins".into()],
                ports: vec!["*:22".into()],
            }],
            ..Default::default()
        };
        let nodes = vec![node("alice", "100.64.0.1", &[])];
        let first = compile(&policy, &nodes).unwrap();
        let second = compile(&policy, &nodes).unwrap();
        assert_eq!(first, second);
    }
}
