//! engine::index
//!
//! Index of a cloned subtree by origin identity.
//!
//! # Invariants
//!
//! - Built once per job run, before any rewrite, and never mutated after
//! - First write wins for a repeated origin id
//! - Never mutates content

use std::collections::HashMap;

use serde::Serialize;

use crate::core::node::Node;
use crate::core::types::NodeId;
use crate::store::{ContentStore, StoreError};

/// Mapping from origin node id to the id of its clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginToCloneMap {
    entries: HashMap<NodeId, NodeId>,
    duplicates: usize,
}

impl OriginToCloneMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `origin -> clone` unless `origin` is already mapped.
    ///
    /// Returns whether the entry was inserted.
    pub fn insert(&mut self, origin: NodeId, clone: NodeId) -> bool {
        if self.entries.contains_key(&origin) {
            self.duplicates += 1;
            return false;
        }
        self.entries.insert(origin, clone);
        true
    }

    /// The clone of `origin`, if indexed.
    pub fn get(&self, origin: &NodeId) -> Option<&NodeId> {
        self.entries.get(origin)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many origin ids were seen again after their first entry.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Entries sorted by origin id.
    pub fn entries(&self) -> Vec<MapEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(origin, clone)| MapEntry {
                origin: *origin,
                clone: *clone,
            })
            .collect();
        entries.sort_by_key(|e| e.origin);
        entries
    }
}

/// One `origin -> clone` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MapEntry {
    pub origin: NodeId,
    pub clone: NodeId,
}

/// Index `copy_root` (and its descendants when `deep`) by origin id.
///
/// Nodes without an origin id are visited but not indexed; their
/// descendants still are.
///
/// # Example
///
/// ```
/// use relink::engine::index::build_map;
/// use relink::store::{ContentStore, InMemoryStore};
///
/// let store = InMemoryStore::new("master");
/// let a = store.add_root("a").unwrap();
/// let b = store.add_child(&a, "b").unwrap();
/// let copies = store.add_root("copies").unwrap();
/// let copy = store.clone_subtree(&a, &copies, "a2").unwrap();
///
/// let copy_root = store.get_node(&copy).unwrap().unwrap();
/// let map = build_map(&store, &copy_root, true).unwrap();
/// assert_eq!(map.len(), 2);
/// assert_eq!(map.get(&a), Some(&copy));
/// assert!(map.get(&b).is_some());
///
/// let shallow = build_map(&store, &copy_root, false).unwrap();
/// assert_eq!(shallow.len(), 1);
/// ```
pub fn build_map<S: ContentStore + ?Sized>(
    store: &S,
    copy_root: &Node,
    deep: bool,
) -> Result<OriginToCloneMap, StoreError> {
    let mut map = OriginToCloneMap::new();
    index_node(store, copy_root, deep, &mut map)?;
    tracing::debug!(
        root = %copy_root.path,
        entries = map.len(),
        duplicates = map.duplicates(),
        "indexed cloned subtree"
    );
    Ok(map)
}

fn index_node<S: ContentStore + ?Sized>(
    store: &S,
    node: &Node,
    deep: bool,
    map: &mut OriginToCloneMap,
) -> Result<(), StoreError> {
    if let Some(origin) = node.origin {
        // TODO: duplicates point at a cloning bug upstream; decide whether to fail instead.
        if !map.insert(origin, node.id) {
            tracing::debug!(
                node = %node.path,
                origin = %origin,
                "origin already indexed, keeping first clone"
            );
        }
    }
    if !deep {
        return Ok(());
    }
    for child in store.children(&node.id)? {
        index_node(store, &child, deep, map)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FailOn, InMemoryStore};

    #[test]
    fn first_write_wins() {
        let mut map = OriginToCloneMap::new();
        let origin = NodeId::generate();
        let first = NodeId::generate();

        assert!(map.insert(origin, first));
        assert!(!map.insert(origin, NodeId::generate()));
        assert_eq!(map.get(&origin), Some(&first));
        assert_eq!(map.len(), 1);
        assert_eq!(map.duplicates(), 1);
    }

    #[test]
    fn duplicate_origins_in_tree_keep_preorder_first() {
        let store = InMemoryStore::new("master");
        let root = store.add_root("copy").unwrap();
        let x = store.add_child(&root, "x").unwrap();
        let y = store.add_child(&root, "y").unwrap();
        let origin = NodeId::generate();
        store.modify(&x, |n| n.origin = Some(origin)).unwrap();
        store.modify(&y, |n| n.origin = Some(origin)).unwrap();

        let root_node = store.get_node(&root).unwrap().unwrap();
        let map = build_map(&store, &root_node, true).unwrap();
        assert_eq!(map.get(&origin), Some(&x));
        assert_eq!(map.duplicates(), 1);
    }

    #[test]
    fn nodes_without_origin_are_traversed_not_indexed() {
        let store = InMemoryStore::new("master");
        let root = store.add_root("copy").unwrap();
        let plain = store.add_child(&root, "plain").unwrap();
        let deep_child = store.add_child(&plain, "cloned").unwrap();
        let origin = NodeId::generate();
        store.modify(&deep_child, |n| n.origin = Some(origin)).unwrap();

        let root_node = store.get_node(&root).unwrap().unwrap();
        let map = build_map(&store, &root_node, true).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&origin), Some(&deep_child));
    }

    #[test]
    fn shallow_index_ignores_children() {
        let store = InMemoryStore::new("master");
        let root = store.add_root("copy").unwrap();
        let child = store.add_child(&root, "c").unwrap();
        store.modify(&child, |n| n.origin = Some(NodeId::generate())).unwrap();

        let root_node = store.get_node(&root).unwrap().unwrap();
        assert!(build_map(&store, &root_node, false).unwrap().is_empty());
    }

    #[test]
    fn store_errors_propagate() {
        let store = InMemoryStore::new("master");
        let root = store.add_root("copy").unwrap();
        let root_node = store.get_node(&root).unwrap().unwrap();
        let store = store.fail_on(FailOn::Children(StoreError::Backend("down".into())));

        assert!(build_map(&store, &root_node, true).is_err());
        assert!(build_map(&store, &root_node, false).is_ok());
    }

    #[test]
    fn entries_are_sorted() {
        let mut map = OriginToCloneMap::new();
        for _ in 0..5 {
            map.insert(NodeId::generate(), NodeId::generate());
        }
        let entries = map.entries();
        assert!(entries.windows(2).all(|w| w[0].origin <= w[1].origin));
    }
}
