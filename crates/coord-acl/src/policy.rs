use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AclError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AclEntry {
    pub action: String,
    pub users: Vec<String>,
    pub ports: Vec<String>,
}

/// The reloadable ACL document (spec §3 `ACLPolicy`, §6.3 policy file).
///
/// Parsed from a permissive JSON dialect: comments and trailing commas are
/// tolerated, matching the on-disk format operators hand-edit.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Policy {
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
    #[serde(default, rename = "tagOwners")]
    pub tag_owners: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub hosts: HashMap<String, String>,
    #[serde(default)]
    pub acls: Vec<AclEntry>,
}

impl Policy {
    /// Parse a policy document from its on-disk JSON5 representation.
    pub fn parse(raw: &str) -> Result<Self, AclError> {
        if raw.trim().is_empty() {
            return Err(AclError::EmptyPolicy);
        }
        let policy: Policy = json5::from_str(raw).map_err(|e| AclError::Parse(e.to_string()))?;
        if policy.acls.is_empty() && policy.groups.is_empty() && policy.hosts.is_empty() {
            return Err(AclError::EmptyPolicy);
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_rejected() {
        assert_eq!(Policy::parse("").unwrap_err(), AclError::EmptyPolicy);
        assert_eq!(Policy::parse("   \n").unwrap_err(), AclError::EmptyPolicy);
    }

    #[test]
    fn tolerates_comments_and_trailing_commas() {
        let raw = r#"{
            // admins group
            "groups": { "admins": ["alice"], },
            "acls": [
                { "action": "accept", "users": ["group:admins"], "ports": ["*:22"], },
            ],
        }"#;
        let policy = Policy::parse(raw).unwrap();
        assert_eq!(policy.groups.get("admins").unwrap(), &vec!["alice".to_string()]);
        assert_eq!(policy.acls.len(), 1);
    }

    #[test]
    fn reads_tag_owners_camel_case_key() {
        let raw = r#"{ "tagOwners": { "tag:web": ["alice"] }, "acls": [{"action":"accept","users":["*"],"ports":["*:*"]}] }"#;
        let policy = Policy::parse(raw).unwrap();
        assert_eq!(policy.tag_owners.get("tag:web").unwrap(), &vec!["alice".to_string()]);
    }
}
