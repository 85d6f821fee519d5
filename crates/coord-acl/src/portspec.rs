use crate::error::AclError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const ALL: PortRange = PortRange { start: 0, end: 65535 };
}

/// Split a `host:port-spec` ACL destination token into its host alias and
/// parsed port ranges (spec §4.3 "Port token" parsing).
///
/// A tag-prefixed host uses two colons (`tag:x:443`) and is handled as three
/// raw tokens; every other form uses two.
pub fn parse_dest_token(token: &str) -> Result<(String, Vec<PortRange>), AclError> {
    let parts: Vec<&str> = token.split(':').collect();
    let (host, port_spec) = match parts.len() {
        2 => (parts[0].to_string(), parts[1]),
        3 if parts[0] == "tag" => (format!("tag:{}", parts[1]), parts[2]),
        _ => return Err(AclError::InvalidPortFormat(token.to_string())),
    };
    let ports = parse_port_spec(port_spec)?;
    Ok((host, ports))
}

fn parse_port_spec(spec: &str) -> Result<Vec<PortRange>, AclError> {
    if spec.is_empty() {
        return Err(AclError::InvalidPortFormat(spec.to_string()));
    }
    if spec == "*" {
        return Ok(vec![PortRange::ALL]);
    }
    spec.split(',').map(parse_one_range).collect()
}

fn parse_one_range(segment: &str) -> Result<PortRange, AclError> {
    let invalid = || AclError::InvalidPortFormat(segment.to_string());
    if let Some((lo, hi)) = segment.split_once('-') {
        let start: u16 = lo.parse().map_err(|_| invalid())?;
        let end: u16 = hi.parse().map_err(|_| invalid())?;
        if start > end {
            return Err(invalid());
        }
        Ok(PortRange { start, end })
    } else {
        let port: u16 = segment.parse().map_err(|_| invalid())?;
        Ok(PortRange { start: port, end: port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cidr_with_port_list() {
        let (host, ports) = parse_dest_token("10.0.0.0/8:80,443,8000-8100").unwrap();
        assert_eq!(host, "10.0.0.0/8");
        assert_eq!(
            ports,
            vec![
                PortRange { start: 80, end: 80 },
                PortRange { start: 443, end: 443 },
                PortRange { start: 8000, end: 8100 },
            ]
        );
    }

    #[test]
    fn parses_tag_prefixed_host() {
        let (host, ports) = parse_dest_token("tag:web:443").unwrap();
        assert_eq!(host, "tag:web");
        assert_eq!(ports, vec![PortRange { start: 443, end: 443 }]);
    }

    #[test]
    fn wildcard_port_spec_expands_to_full_range() {
        let (_, ports) = parse_dest_token("*:*").unwrap();
        assert_eq!(ports, vec![PortRange::ALL]);
    }

    #[test]
    fn rejects_malformed_token() {
        assert_eq!(
            parse_dest_token("foo:bar:baz:qux").unwrap_err(),
            AclError::InvalidPortFormat("foo:bar:baz:qux".to_string())
        );
    }

    #[test]
    fn rejects_out_of_order_range() {
        assert!(parse_dest_token("10.0.0.0/8:100-50").is_err());
    }
}
