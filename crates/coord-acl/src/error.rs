use thiserror::Error;

/// Validation failures raised while compiling a policy document. These are
/// reported to the operator at load time; the caller keeps running the
/// previously compiled rule set (spec §7).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AclError {
    #[error("acl entry has a non-accept action: {0}")]
    InvalidAction(String),
    #[error("could not resolve user-section alias: {0}")]
    InvalidUserSection(String),
    #[error("group reference is not a group: {0}")]
    InvalidGroup(String),
    #[error("tag has no tag_owners entry: {0}")]
    InvalidTag(String),
    #[error("namespace reference is invalid: {0}")]
    InvalidNamespace(String),
    #[error("malformed port specification: {0}")]
    InvalidPortFormat(String),
    #[error("policy document is empty")]
    EmptyPolicy,
    #[error("malformed policy document: {0}")]
    Parse(String),
}
