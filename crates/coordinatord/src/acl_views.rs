//! Bridges the store's `Node` rows to the ACL compiler's decoupled
//! `NodeView`, resolving namespace ids to the names the policy document
//! references by.

use std::collections::HashMap;

use coord_acl::NodeView;
use coord_store::models::Node;
use coord_store::Store;
use uuid::Uuid;

use crate::error::ApiResult;

pub async fn nodes_to_views(store: &Store, nodes: &[Node]) -> ApiResult<Vec<NodeView>> {
    let mut namespace_names: HashMap<Uuid, String> = HashMap::new();
    let mut views = Vec::with_capacity(nodes.len());

    for node in nodes {
        let name = match namespace_names.get(&node.namespace_id) {
            Some(name) => name.clone(),
            None => {
                let ns = store.namespaces.get_by_id(node.namespace_id).await?;
                namespace_names.insert(node.namespace_id, ns.name.clone());
                ns.name
            }
        };
        views.push(NodeView::new(
            name,
            vec![node.ipv4.clone(), node.ipv6.clone()],
            node.host_info.request_tags.clone(),
        ));
    }

    Ok(views)
}
