//! store::memory
//!
//! In-memory content store that also serves as its own reference index.
//!
//! # Design
//!
//! The store keeps nodes in a map behind `Arc<Mutex<...>>`, so clones of
//! an `InMemoryStore` share state and the store can be handed to a
//! scheduler thread. Pending edits are staged per version and only merged
//! into node content on the outermost `end_edit`.
//!
//! For tests it records edit operations and can be told to fail a chosen
//! operation ([`FailOn`]). [`InMemoryStore::clone_subtree`] builds clone
//! fixtures the way a cloning collaborator would (origin and
//! source-of-copy set, content copied verbatim).
//!
//! # Example
//!
//! ```
//! use relink::core::node::FieldValue;
//! use relink::core::types::{FieldId, Language};
//! use relink::store::{ContentStore, InMemoryStore};
//!
//! let store = InMemoryStore::new("master");
//! let en = Language::new("en").unwrap();
//! let home = store.add_root("home").unwrap();
//! let about = store.add_child(&home, "about").unwrap();
//!
//! let v1 = store.add_version(&home, &en).unwrap();
//! let link = FieldId::generate();
//! store.set_field(&home, &en, v1, link, FieldValue::Link(Some(about))).unwrap();
//!
//! let node = store.get_node(&about).unwrap().unwrap();
//! assert_eq!(node.path.as_str(), "/home/about");
//! assert_eq!(node.store, "master");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::traits::{ContentStore, ReferenceSource, StoreError};
use crate::core::node::{FieldKind, FieldValue, ItemVersion, Node, Reference, VersionedNode};
use crate::core::types::{FieldId, Language, NodeId, NodePath, Version, VersionKey};

/// Serializable form of a whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub name: String,
    pub nodes: Vec<Node>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail get_node with the given error.
    GetNode(StoreError),
    /// Fail children with the given error.
    Children(StoreError),
    /// Fail begin_edit with the given error.
    BeginEdit(StoreError),
    /// Fail write_field with the given error.
    WriteField(StoreError),
    /// Fail end_edit with the given error.
    EndEdit(StoreError),
    /// Fail outbound_references with the given error.
    References(StoreError),
}

/// Recorded edit operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    BeginEdit(VersionKey),
    WriteField { key: VersionKey, field: FieldId },
    EndEdit(VersionKey),
    CancelEdit(VersionKey),
    /// The outermost `end_edit` merged the edit into stored content.
    Committed(VersionKey),
}

#[derive(Debug)]
struct PendingEdit {
    depth: usize,
    fields: BTreeMap<FieldId, FieldValue>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<NodeId, Node>,
    edits: HashMap<VersionKey, PendingEdit>,
    fail_on: Option<FailOn>,
    operations: Vec<StoreOperation>,
}

/// In-memory content store.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    name: String,
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Rebuild a store from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Inconsistent` if parent/child links disagree or
    /// a child path does not extend its parent's path.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let nodes: BTreeMap<NodeId, Node> = snapshot
            .nodes
            .into_iter()
            .map(|node| (node.id, node))
            .collect();

        for node in nodes.values() {
            for child_id in &node.children {
                let child = nodes.get(child_id).ok_or_else(|| {
                    StoreError::Inconsistent(format!(
                        "{} lists missing child {}",
                        node.path, child_id
                    ))
                })?;
                if child.parent != Some(node.id) {
                    return Err(StoreError::Inconsistent(format!(
                        "{} is listed under {} but names another parent",
                        child.path, node.path
                    )));
                }
                if child.path != node.path.join(&child.name) {
                    return Err(StoreError::Inconsistent(format!(
                        "{} does not extend its parent path {}",
                        child.path, node.path
                    )));
                }
            }
            if let Some(parent) = node.parent {
                let listed = nodes
                    .get(&parent)
                    .is_some_and(|p| p.children.contains(&node.id));
                if !listed {
                    return Err(StoreError::Inconsistent(format!(
                        "{} names parent {} which does not list it",
                        node.path, parent
                    )));
                }
            }
        }

        let store = Self::new(snapshot.name);
        store.lock().nodes = nodes;
        Ok(store)
    }

    /// Capture the committed content of the store.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.lock();
        StoreSnapshot {
            name: self.name.clone(),
            nodes: inner.nodes.values().cloned().collect(),
        }
    }

    /// Configure the store to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// Get all recorded edit operations.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.lock().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Number of nodes in the store.
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    // =========================================================================
    // Building content
    // =========================================================================

    /// Add a top-level node.
    pub fn add_root(&self, name: &str) -> Result<NodeId, StoreError> {
        let path = NodePath::new(format!("/{name}"))
            .map_err(|e| StoreError::Inconsistent(e.to_string()))?;
        let id = NodeId::generate();
        self.lock().nodes.insert(id, Node::new(id, name, path));
        Ok(id)
    }

    /// Add a node as the last child of `parent`.
    pub fn add_child(&self, parent: &NodeId, name: &str) -> Result<NodeId, StoreError> {
        let mut inner = self.lock();
        let parent_node = inner
            .nodes
            .get_mut(parent)
            .ok_or(StoreError::NodeNotFound(*parent))?;
        let path = NodePath::new(parent_node.path.join(name).as_str())
            .map_err(|e| StoreError::Inconsistent(e.to_string()))?;
        let id = NodeId::generate();
        parent_node.children.push(id);

        let mut node = Node::new(id, name, path);
        node.parent = Some(*parent);
        inner.nodes.insert(id, node);
        Ok(id)
    }

    /// Add the next version of `language` to a node.
    pub fn add_version(&self, id: &NodeId, language: &Language) -> Result<Version, StoreError> {
        let mut inner = self.lock();
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or(StoreError::NodeNotFound(*id))?;
        let version = node.next_version(language);
        node.versions
            .push(ItemVersion::new(language.clone(), version));
        Ok(version)
    }

    /// Write a field directly into stored content, bypassing edits.
    pub fn set_field(
        &self,
        id: &NodeId,
        language: &Language,
        version: Version,
        field: FieldId,
        value: FieldValue,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or(StoreError::NodeNotFound(*id))?;
        let path = node.path.clone();
        let item_version = node.version_mut(language, version).ok_or_else(|| {
            StoreError::Inconsistent(format!("{path} has no version {language}#{version}"))
        })?;
        item_version.fields.insert(field, value);
        Ok(())
    }

    /// Apply an arbitrary change to a stored node.
    pub fn modify(&self, id: &NodeId, change: impl FnOnce(&mut Node)) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or(StoreError::NodeNotFound(*id))?;
        change(node);
        Ok(())
    }

    /// Read a committed field value.
    pub fn field(
        &self,
        id: &NodeId,
        language: &Language,
        version: Version,
        field: &FieldId,
    ) -> Option<FieldValue> {
        let inner = self.lock();
        inner
            .nodes
            .get(id)?
            .version(language, version)?
            .fields
            .get(field)
            .cloned()
    }

    /// Copy the subtree at `source` under `parent` as `name`.
    ///
    /// Every copied node gets a fresh id, its origin and source-of-copy
    /// set to the node it was copied from, and that node's content copied
    /// verbatim, so its references still point into the original subtree.
    /// Returns the id of the new subtree root.
    pub fn clone_subtree(
        &self,
        source: &NodeId,
        parent: &NodeId,
        name: &str,
    ) -> Result<NodeId, StoreError> {
        let copy_root = self.add_child(parent, name)?;
        self.copy_into(source, &copy_root)?;
        Ok(copy_root)
    }

    fn copy_into(&self, source: &NodeId, copy: &NodeId) -> Result<(), StoreError> {
        let original = self
            .lock()
            .nodes
            .get(source)
            .cloned()
            .ok_or(StoreError::NodeNotFound(*source))?;

        self.modify(copy, |node| {
            node.origin = Some(original.id);
            node.source_of_copy = Some(original.id);
            node.versions = original.versions.clone();
        })?;

        for child in &original.children {
            let name = self
                .lock()
                .nodes
                .get(child)
                .map(|n| n.name.clone())
                .ok_or(StoreError::NodeNotFound(*child))?;
            let child_copy = self.add_child(copy, &name)?;
            self.copy_into(child, &child_copy)?;
        }
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stamped(&self, node: &Node) -> Node {
        let mut node = node.clone();
        node.store = self.name.clone();
        node
    }

    /// Return the configured error if `op` should fail.
    fn check_fail(&self, op: &str) -> Result<(), StoreError> {
        let inner = self.lock();
        match (&inner.fail_on, op) {
            (Some(FailOn::GetNode(e)), "get_node")
            | (Some(FailOn::Children(e)), "children")
            | (Some(FailOn::BeginEdit(e)), "begin_edit")
            | (Some(FailOn::WriteField(e)), "write_field")
            | (Some(FailOn::EndEdit(e)), "end_edit")
            | (Some(FailOn::References(e)), "outbound_references") => Err(e.clone()),
            _ => Ok(()),
        }
    }
}

impl ContentStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_node(&self, id: &NodeId) -> Result<Option<Node>, StoreError> {
        self.check_fail("get_node")?;
        let inner = self.lock();
        Ok(inner.nodes.get(id).map(|node| self.stamped(node)))
    }

    fn get_version(
        &self,
        id: &NodeId,
        language: &Language,
        version: Version,
    ) -> Result<Option<VersionedNode>, StoreError> {
        let inner = self.lock();
        let Some(node) = inner.nodes.get(id) else {
            return Ok(None);
        };
        Ok(node.version(language, version).map(|item| VersionedNode {
            key: VersionKey::new(node.id, item.language.clone(), item.version),
            path: node.path.clone(),
            store: self.name.clone(),
            fields: item.fields.clone(),
        }))
    }

    fn children(&self, id: &NodeId) -> Result<Vec<Node>, StoreError> {
        self.check_fail("children")?;
        let inner = self.lock();
        let node = inner.nodes.get(id).ok_or(StoreError::NodeNotFound(*id))?;
        node.children
            .iter()
            .map(|child| {
                inner
                    .nodes
                    .get(child)
                    .map(|c| self.stamped(c))
                    .ok_or_else(|| {
                        StoreError::Inconsistent(format!(
                            "{} lists missing child {}",
                            node.path, child
                        ))
                    })
            })
            .collect()
    }

    fn begin_edit(&self, key: &VersionKey) -> Result<(), StoreError> {
        self.check_fail("begin_edit")?;
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::BeginEdit(key.clone()));

        if let Some(pending) = inner.edits.get_mut(key) {
            pending.depth += 1;
            return Ok(());
        }

        let node = inner
            .nodes
            .get(&key.node)
            .ok_or(StoreError::NodeNotFound(key.node))?;
        let fields = node
            .version(&key.language, key.version)
            .map(|item| item.fields.clone())
            .ok_or_else(|| {
                StoreError::Inconsistent(format!(
                    "{} has no version {}#{}",
                    node.path, key.language, key.version
                ))
            })?;
        inner
            .edits
            .insert(key.clone(), PendingEdit { depth: 1, fields });
        Ok(())
    }

    fn write_field(
        &self,
        key: &VersionKey,
        field: &FieldId,
        value: FieldValue,
    ) -> Result<(), StoreError> {
        self.check_fail("write_field")?;
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::WriteField {
            key: key.clone(),
            field: *field,
        });
        let pending = inner
            .edits
            .get_mut(key)
            .ok_or_else(|| StoreError::NotEditing(key.clone()))?;
        pending.fields.insert(*field, value);
        Ok(())
    }

    fn end_edit(&self, key: &VersionKey) -> Result<(), StoreError> {
        self.check_fail("end_edit")?;
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::EndEdit(key.clone()));

        let pending = inner
            .edits
            .get_mut(key)
            .ok_or_else(|| StoreError::NotEditing(key.clone()))?;
        pending.depth -= 1;
        if pending.depth > 0 {
            return Ok(());
        }

        let Some(pending) = inner.edits.remove(key) else {
            return Err(StoreError::NotEditing(key.clone()));
        };
        let node = inner
            .nodes
            .get_mut(&key.node)
            .ok_or(StoreError::NodeNotFound(key.node))?;
        let path = node.path.clone();
        let item = node
            .version_mut(&key.language, key.version)
            .ok_or_else(|| {
                StoreError::Inconsistent(format!(
                    "{path} lost version {}#{} during an edit",
                    key.language, key.version
                ))
            })?;
        item.fields = pending.fields;
        inner.operations.push(StoreOperation::Committed(key.clone()));
        Ok(())
    }

    fn cancel_edit(&self, key: &VersionKey) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.operations.push(StoreOperation::CancelEdit(key.clone()));
        inner
            .edits
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotEditing(key.clone()))
    }
}

impl ReferenceSource for InMemoryStore {
    fn outbound_references(
        &self,
        node: &Node,
        include_all_versions: bool,
        include_structural: bool,
    ) -> Result<Vec<Reference>, StoreError> {
        self.check_fail("outbound_references")?;
        let inner = self.lock();
        let Some(stored) = inner.nodes.get(&node.id) else {
            return Ok(Vec::new());
        };

        let versions: Vec<&ItemVersion> = if include_all_versions {
            stored.versions.iter().collect()
        } else {
            let mut latest: BTreeMap<&Language, &ItemVersion> = BTreeMap::new();
            for item in &stored.versions {
                let entry = latest.entry(&item.language).or_insert(item);
                if item.version > entry.version {
                    *entry = item;
                }
            }
            latest.into_values().collect()
        };

        let mut references = Vec::new();
        for item in versions {
            for (field, value) in &item.fields {
                for target in value.targets() {
                    references.push(Reference {
                        source: stored.id,
                        field: *field,
                        kind: value.kind(),
                        language: item.language.clone(),
                        version: item.version,
                        target,
                    });
                }
            }
            if let (true, Some(source_of_copy)) = (include_structural, stored.source_of_copy) {
                references.push(Reference {
                    source: stored.id,
                    field: FieldId::SOURCE_OF_COPY,
                    kind: FieldKind::Link,
                    language: item.language.clone(),
                    version: item.version,
                    target: source_of_copy,
                });
            }
        }
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn en() -> Language {
        Language::new("en").unwrap()
    }

    fn store_with_link() -> (InMemoryStore, NodeId, NodeId, FieldId) {
        let store = InMemoryStore::new("master");
        let a = store.add_root("a").unwrap();
        let b = store.add_child(&a, "b").unwrap();
        let v = store.add_version(&a, &en()).unwrap();
        let field = FieldId::generate();
        store
            .set_field(&a, &en(), v, field, FieldValue::Link(Some(b)))
            .unwrap();
        (store, a, b, field)
    }

    #[test]
    fn children_in_order() {
        let store = InMemoryStore::new("master");
        let root = store.add_root("root").unwrap();
        let x = store.add_child(&root, "x").unwrap();
        let y = store.add_child(&root, "y").unwrap();

        let ids: Vec<_> = store.children(&root).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![x, y]);
    }

    #[test]
    fn missing_node_is_none_not_error() {
        let store = InMemoryStore::new("master");
        assert!(store.get_node(&NodeId::generate()).unwrap().is_none());
        assert!(store
            .get_version(&NodeId::generate(), &en(), Version::UNSET)
            .unwrap()
            .is_none());
    }

    #[test]
    fn get_version_resolves_unset_to_latest() {
        let store = InMemoryStore::new("master");
        let a = store.add_root("a").unwrap();
        store.add_version(&a, &en()).unwrap();
        store.add_version(&a, &en()).unwrap();

        let latest = store.get_version(&a, &en(), Version::UNSET).unwrap().unwrap();
        assert_eq!(latest.key.version, Version::new(2));
    }

    #[test]
    fn edit_is_invisible_until_end() {
        let (store, a, b, field) = store_with_link();
        let key = VersionKey::new(a, en(), Version::new(1));

        store.begin_edit(&key).unwrap();
        store
            .write_field(&key, &field, FieldValue::Link(None))
            .unwrap();
        assert_eq!(
            store.field(&a, &en(), Version::new(1), &field),
            Some(FieldValue::Link(Some(b)))
        );

        store.end_edit(&key).unwrap();
        assert_eq!(
            store.field(&a, &en(), Version::new(1), &field),
            Some(FieldValue::Link(None))
        );
    }

    #[test]
    fn nested_edit_commits_on_outermost_end() {
        let (store, a, _, field) = store_with_link();
        let key = VersionKey::new(a, en(), Version::new(1));

        store.begin_edit(&key).unwrap();
        store.begin_edit(&key).unwrap();
        store
            .write_field(&key, &field, FieldValue::Link(None))
            .unwrap();
        store.end_edit(&key).unwrap();
        assert!(!store.operations().contains(&StoreOperation::Committed(key.clone())));

        store.end_edit(&key).unwrap();
        assert!(store.operations().contains(&StoreOperation::Committed(key)));
    }

    #[test]
    fn cancel_discards_pending_writes() {
        let (store, a, b, field) = store_with_link();
        let key = VersionKey::new(a, en(), Version::new(1));

        store.begin_edit(&key).unwrap();
        store
            .write_field(&key, &field, FieldValue::Link(None))
            .unwrap();
        store.cancel_edit(&key).unwrap();

        assert_eq!(
            store.field(&a, &en(), Version::new(1), &field),
            Some(FieldValue::Link(Some(b)))
        );
        assert!(matches!(store.end_edit(&key), Err(StoreError::NotEditing(_))));
    }

    #[test]
    fn write_without_edit_fails() {
        let (store, a, _, field) = store_with_link();
        let key = VersionKey::new(a, en(), Version::new(1));
        assert!(matches!(
            store.write_field(&key, &field, FieldValue::Link(None)),
            Err(StoreError::NotEditing(_))
        ));
    }

    #[test]
    fn references_include_structural_pointer_on_request() {
        let (store, a, b, field) = store_with_link();
        let origin = NodeId::generate();
        store.modify(&a, |n| n.source_of_copy = Some(origin)).unwrap();
        let node = store.get_node(&a).unwrap().unwrap();

        let plain = store.outbound_references(&node, true, false).unwrap();
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].field, field);
        assert_eq!(plain[0].target, b);

        let with_structural = store.outbound_references(&node, true, true).unwrap();
        assert_eq!(with_structural.len(), 2);
        assert!(with_structural
            .iter()
            .any(|r| r.is_structural() && r.target == origin));
    }

    #[test]
    fn latest_only_references() {
        let (store, a, _, field) = store_with_link();
        let v2 = store.add_version(&a, &en()).unwrap();
        let other = store.add_root("other").unwrap();
        store
            .set_field(&a, &en(), v2, field, FieldValue::Link(Some(other)))
            .unwrap();
        let node = store.get_node(&a).unwrap().unwrap();

        let latest = store.outbound_references(&node, false, false).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].target, other);
        assert_eq!(store.outbound_references(&node, true, false).unwrap().len(), 2);
    }

    #[test]
    fn clone_subtree_sets_origin_and_copies_content() {
        let (store, a, b, field) = store_with_link();
        let target_parent = store.add_root("copies").unwrap();

        let copy = store.clone_subtree(&a, &target_parent, "a2").unwrap();
        let copy_node = store.get_node(&copy).unwrap().unwrap();
        assert_eq!(copy_node.origin, Some(a));
        assert_eq!(copy_node.source_of_copy, Some(a));
        assert_eq!(copy_node.path.as_str(), "/copies/a2");

        let children = store.children(&copy).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].origin, Some(b));
        assert_eq!(children[0].path.as_str(), "/copies/a2/b");

        // Content still points at the original child.
        assert_eq!(
            store.field(&copy, &en(), Version::new(1), &field),
            Some(FieldValue::Link(Some(b)))
        );
    }

    #[test]
    fn fail_on_injects_errors() {
        let store = InMemoryStore::new("master")
            .fail_on(FailOn::GetNode(StoreError::Backend("down".into())));
        assert!(store.get_node(&NodeId::generate()).is_err());
        store.clear_fail_on();
        assert!(store.get_node(&NodeId::generate()).is_ok());
    }

    #[test]
    fn snapshot_round_trip_preserves_tree() {
        let (store, a, _, _) = store_with_link();
        let rebuilt = InMemoryStore::from_snapshot(store.snapshot()).unwrap();
        assert_eq!(rebuilt.node_count(), 2);
        assert_eq!(rebuilt.children(&a).unwrap().len(), 1);
        assert_eq!(rebuilt.name(), "master");
    }

    #[test]
    fn snapshot_with_dangling_child_rejected() {
        let (store, a, _, _) = store_with_link();
        let mut snapshot = store.snapshot();
        snapshot.nodes.retain(|n| n.id == a);
        assert!(matches!(
            InMemoryStore::from_snapshot(snapshot),
            Err(StoreError::Inconsistent(_))
        ));
    }
}
