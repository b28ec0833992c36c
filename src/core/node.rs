//! core::node
//!
//! Content nodes, their versioned field content, and the references
//! between them.
//!
//! # Model
//!
//! A [`Node`] is one entry of the content tree. Its content lives in
//! [`ItemVersion`]s, one per (language, version) pair, each holding a map
//! of [`FieldValue`]s. Link-bearing field values produce [`Reference`]s,
//! which are what the remapping job rewrites.
//!
//! The source-of-copy pointer and the origin identity are plain ids. They
//! are resolved through the store on demand and never held as live edges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{FieldId, Language, NodeId, NodePath, Version, VersionKey};

/// The kind of a field, as seen by the reference source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Plain text, carries no references.
    Text,
    /// A single link to another node.
    Link,
    /// An ordered list of links.
    Multilist,
    /// A link pinned to a language/version of its target.
    ///
    /// Resolved dynamically by consumers, so never rewritten statically.
    VersionLink,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Link => write!(f, "link"),
            FieldKind::Multilist => write!(f, "multilist"),
            FieldKind::VersionLink => write!(f, "version_link"),
        }
    }
}

/// A stored field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Link(Option<NodeId>),
    Multilist(Vec<NodeId>),
    VersionLink {
        target: NodeId,
        language: Language,
        version: Version,
    },
}

impl FieldValue {
    /// The kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Link(_) => FieldKind::Link,
            FieldValue::Multilist(_) => FieldKind::Multilist,
            FieldValue::VersionLink { .. } => FieldKind::VersionLink,
        }
    }

    /// Target ids referenced by this value, in stored order.
    pub fn targets(&self) -> Vec<NodeId> {
        match self {
            FieldValue::Text(_) => Vec::new(),
            FieldValue::Link(target) => target.iter().copied().collect(),
            FieldValue::Multilist(targets) => targets.clone(),
            FieldValue::VersionLink { target, .. } => vec![*target],
        }
    }

    /// Replace `old` with `new` wherever it appears.
    ///
    /// The variant is preserved: a link stays a link, a list keeps its
    /// order and length. Text and version links are left alone.
    /// Returns whether anything changed.
    ///
    /// # Example
    ///
    /// ```
    /// use relink::core::node::FieldValue;
    /// use relink::core::types::NodeId;
    ///
    /// let (a, b, c) = (NodeId::generate(), NodeId::generate(), NodeId::generate());
    /// let mut value = FieldValue::Multilist(vec![a, b, a]);
    ///
    /// assert!(value.relink(&a, &c));
    /// assert_eq!(value, FieldValue::Multilist(vec![c, b, c]));
    /// assert!(!value.relink(&a, &c));
    /// ```
    pub fn relink(&mut self, old: &NodeId, new: &NodeId) -> bool {
        match self {
            FieldValue::Link(Some(target)) if target == old => {
                *target = *new;
                true
            }
            FieldValue::Multilist(targets) => {
                let mut changed = false;
                for target in targets.iter_mut().filter(|t| *t == old) {
                    *target = *new;
                    changed = true;
                }
                changed
            }
            _ => false,
        }
    }

    /// A stable textual form used for fingerprinting.
    pub fn canonical(&self) -> String {
        match self {
            FieldValue::Text(text) => format!("text:{text}"),
            FieldValue::Link(Some(target)) => format!("link:{target}"),
            FieldValue::Link(None) => "link:".to_string(),
            FieldValue::Multilist(targets) => format!(
                "multilist:{}",
                targets
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("|")
            ),
            FieldValue::VersionLink {
                target,
                language,
                version,
            } => format!("version_link:{target}:{language}:{}", version.number()),
        }
    }
}

/// Field content of one language/version of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVersion {
    pub language: Language,
    pub version: Version,
    #[serde(default)]
    pub fields: BTreeMap<FieldId, FieldValue>,
}

impl ItemVersion {
    /// Create an empty version.
    pub fn new(language: Language, version: Version) -> Self {
        Self {
            language,
            version,
            fields: BTreeMap::new(),
        }
    }
}

/// A content-tree entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub path: NodePath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
    /// The node this one was cloned from. Set on clones only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<NodeId>,
    /// Structural counterpart in the original tree, used to pair a clone
    /// descendant with its source during traversal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_of_copy: Option<NodeId>,
    /// Branch template this node was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<ItemVersion>,
    /// Name of the store this value was read from.
    #[serde(skip)]
    pub store: String,
}

impl Node {
    /// Create a node with no content.
    pub fn new(id: NodeId, name: impl Into<String>, path: NodePath) -> Self {
        Self {
            id,
            name: name.into(),
            path,
            parent: None,
            children: Vec::new(),
            origin: None,
            source_of_copy: None,
            branch: None,
            versions: Vec::new(),
            store: String::new(),
        }
    }

    /// Find a version of this node.
    ///
    /// [`Version::UNSET`] selects the latest version of `language`.
    pub fn version(&self, language: &Language, version: Version) -> Option<&ItemVersion> {
        let mut candidates = self.versions.iter().filter(|v| &v.language == language);
        if version.is_set() {
            candidates.find(|v| v.version == version)
        } else {
            candidates.max_by_key(|v| v.version)
        }
    }

    /// Mutable counterpart of [`Node::version`].
    pub fn version_mut(&mut self, language: &Language, version: Version) -> Option<&mut ItemVersion> {
        let resolved = self.version(language, version)?.version;
        self.versions
            .iter_mut()
            .find(|v| &v.language == language && v.version == resolved)
    }

    /// The next free version number in `language`.
    pub fn next_version(&self, language: &Language) -> Version {
        let latest = self
            .version(language, Version::UNSET)
            .map(|v| v.version.number())
            .unwrap_or(0);
        Version::new(latest + 1)
    }
}

/// One resolved language/version of a node, as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedNode {
    /// Concrete key; the version is never [`Version::UNSET`].
    pub key: VersionKey,
    pub path: NodePath,
    pub store: String,
    pub fields: BTreeMap<FieldId, FieldValue>,
}

/// A directed, field-scoped edge from one version of a node to a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub source: NodeId,
    pub field: FieldId,
    pub kind: FieldKind,
    pub language: Language,
    pub version: Version,
    pub target: NodeId,
}

impl Reference {
    /// Whether this reference reports the structural source-of-copy field.
    pub fn is_structural(&self) -> bool {
        self.field == FieldId::SOURCE_OF_COPY
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}#{}] {} ({}) -> {}",
            self.source, self.language, self.version, self.field, self.kind, self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lang(tag: &str) -> Language {
        Language::new(tag).unwrap()
    }

    fn node_with_versions(versions: &[(&str, u32)]) -> Node {
        let mut node = Node::new(NodeId::generate(), "n", NodePath::new("/n").unwrap());
        for (tag, number) in versions {
            node.versions
                .push(ItemVersion::new(lang(tag), Version::new(*number)));
        }
        node
    }

    #[test]
    fn unset_version_selects_latest_in_language() {
        let node = node_with_versions(&[("en", 1), ("en", 3), ("en", 2), ("de", 7)]);
        let latest = node.version(&lang("en"), Version::UNSET).unwrap();
        assert_eq!(latest.version, Version::new(3));
    }

    #[test]
    fn exact_version_lookup() {
        let node = node_with_versions(&[("en", 1), ("en", 2)]);
        assert!(node.version(&lang("en"), Version::new(2)).is_some());
        assert!(node.version(&lang("en"), Version::new(5)).is_none());
        assert!(node.version(&lang("fr"), Version::UNSET).is_none());
    }

    #[test]
    fn next_version_starts_at_one() {
        let node = node_with_versions(&[("en", 2)]);
        assert_eq!(node.next_version(&lang("en")), Version::new(3));
        assert_eq!(node.next_version(&lang("de")), Version::new(1));
    }

    #[test]
    fn link_relink_replaces_only_matching_target() {
        let (a, b, c) = (NodeId::generate(), NodeId::generate(), NodeId::generate());
        let mut value = FieldValue::Link(Some(a));
        assert!(!value.relink(&b, &c));
        assert!(value.relink(&a, &c));
        assert_eq!(value, FieldValue::Link(Some(c)));
    }

    #[test]
    fn empty_link_and_text_never_change() {
        let (a, b) = (NodeId::generate(), NodeId::generate());
        let mut empty = FieldValue::Link(None);
        let mut text = FieldValue::Text(a.to_string());
        assert!(!empty.relink(&a, &b));
        assert!(!text.relink(&a, &b));
    }

    #[test]
    fn version_link_is_not_relinked() {
        let (a, b) = (NodeId::generate(), NodeId::generate());
        let mut value = FieldValue::VersionLink {
            target: a,
            language: lang("en"),
            version: Version::new(1),
        };
        assert!(!value.relink(&a, &b));
        assert_eq!(value.targets(), vec![a]);
    }

    #[test]
    fn field_value_json_shape() {
        let id = NodeId::parse("0de95ae4-41ab-4d01-9eb0-67441b7c2450").unwrap();
        let json = serde_json::to_string(&FieldValue::Link(Some(id))).unwrap();
        assert_eq!(
            json,
            r#"{"type":"link","value":"{0DE95AE4-41AB-4D01-9EB0-67441B7C2450}"}"#
        );
    }

    #[test]
    fn structural_reference_detection() {
        let reference = Reference {
            source: NodeId::generate(),
            field: FieldId::SOURCE_OF_COPY,
            kind: FieldKind::Link,
            language: lang("en"),
            version: Version::new(1),
            target: NodeId::generate(),
        };
        assert!(reference.is_structural());
    }
}
