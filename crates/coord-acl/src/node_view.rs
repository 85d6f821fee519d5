/// A node as the ACL compiler needs to see it — decoupled from the store's
/// row shape so this crate has no database dependency.
#[derive(Debug, Clone)]
pub struct NodeView {
    pub namespace: String,
    pub ips: Vec<String>,
    pub request_tags: Vec<String>,
}

impl NodeView {
    pub fn new(namespace: impl Into<String>, ips: Vec<String>, request_tags: Vec<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ips,
            request_tags,
        }
    }
}
