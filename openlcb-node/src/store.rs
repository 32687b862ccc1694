//! Generic node storage, indexed by NodeID.
//!
//! You can't remove a node from a store; once it's known, it's known.

use std::collections::HashMap;

use openlcb_core::{Node, NodeId};

#[derive(Debug, Default)]
pub struct NodeStore {
    by_id: HashMap<NodeId, Node>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new node, or replace the stored content for an existing
    /// one with the same id.
    pub fn store(&mut self, node: Node) {
        self.by_id.insert(node.id, node);
    }

    pub fn is_present(&self, id: NodeId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.by_id.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.by_id.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.by_id.values_mut()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Find a node by its user-provided SNIP description.
    pub fn lookup_by_description(&self, description: &str) -> Option<&Node> {
        self.by_id.values().find(|n| n.snip.user_provided_description == description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_lookup() {
        let mut store = NodeStore::new();
        let id = NodeId::new(1);
        store.store(Node::new(id));
        assert!(store.is_present(id));
        assert!(!store.is_present(NodeId::new(2)));
    }

    #[test]
    fn restoring_same_id_replaces_content() {
        let mut store = NodeStore::new();
        let id = NodeId::new(1);
        let mut node = Node::new(id);
        node.snip.user_provided_description = "first".into();
        store.store(node);

        let mut replacement = Node::new(id);
        replacement.snip.user_provided_description = "second".into();
        store.store(replacement);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id).unwrap().snip.user_provided_description, "second");
    }

    #[test]
    fn lookup_by_description_scans_all_nodes() {
        let mut store = NodeStore::new();
        let mut node = Node::new(NodeId::new(1));
        node.snip.user_provided_description = "turntable".into();
        store.store(node);
        assert!(store.lookup_by_description("turntable").is_some());
        assert!(store.lookup_by_description("missing").is_none());
    }
}
