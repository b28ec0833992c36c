//! store::traits
//!
//! Interfaces of the content store and the reference index.
//!
//! # Design
//!
//! Both collaborators live outside the remapping job. The job only relies
//! on these contracts:
//!
//! - Lookups return `Ok(None)` for missing nodes and versions, never an
//!   error, so the caller can report precise context itself.
//! - Edits are scoped per version: `begin_edit` / `end_edit` bracket a
//!   mutation, nest (reentrant per version), and nothing written between
//!   them persists unless the outermost `end_edit` runs. `cancel_edit`
//!   discards the pending edit.
//!
//! Implementations must be `Send + Sync` so a job can move onto a
//! scheduler thread.

use thiserror::Error;

use crate::core::node::{FieldValue, Node, Reference, VersionedNode};
use crate::core::types::{FieldId, Language, NodeId, Version, VersionKey};

/// Errors from store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A node required by a structural operation does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// The store content violates a structural rule.
    #[error("inconsistent store: {0}")]
    Inconsistent(String),

    /// A write or close was issued for a version that is not being edited.
    #[error("no edit in progress for {0}")]
    NotEditing(VersionKey),

    /// The backend failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// Reading or writing the persisted store failed.
    #[error("store i/o error: {0}")]
    Io(String),
}

/// Content store lookups and scoped editing.
pub trait ContentStore: Send + Sync {
    /// Name of the store (database), used in log and audit records.
    fn name(&self) -> &str;

    /// Look up a node by id.
    fn get_node(&self, id: &NodeId) -> Result<Option<Node>, StoreError>;

    /// Look up one language/version of a node.
    ///
    /// [`Version::UNSET`] selects the language-default (latest) version.
    /// The returned key always carries the concrete version.
    fn get_version(
        &self,
        id: &NodeId,
        language: &Language,
        version: Version,
    ) -> Result<Option<VersionedNode>, StoreError>;

    /// Children of a node, in stored order.
    fn children(&self, id: &NodeId) -> Result<Vec<Node>, StoreError>;

    /// Open (or nest into) an edit of one version.
    fn begin_edit(&self, key: &VersionKey) -> Result<(), StoreError>;

    /// Stage a field value inside an open edit.
    fn write_field(&self, key: &VersionKey, field: &FieldId, value: FieldValue)
        -> Result<(), StoreError>;

    /// Close one level of an edit; the outermost close persists it.
    fn end_edit(&self, key: &VersionKey) -> Result<(), StoreError>;

    /// Discard an open edit entirely, every nesting level included.
    fn cancel_edit(&self, key: &VersionKey) -> Result<(), StoreError>;
}

/// The reference (link) index.
pub trait ReferenceSource: Send + Sync {
    /// Outbound references of `node`.
    ///
    /// With `include_all_versions` every stored version is reported,
    /// otherwise only the latest version of each language. With
    /// `include_structural` the source-of-copy pointer is reported as a
    /// reference in [`FieldId::SOURCE_OF_COPY`].
    fn outbound_references(
        &self,
        node: &Node,
        include_all_versions: bool,
        include_structural: bool,
    ) -> Result<Vec<Reference>, StoreError>;
}

/// A store that is also its own reference index.
///
/// Blanket-implemented; the remapping job is generic over it.
pub trait ContentBackend: ContentStore + ReferenceSource {}

impl<T: ContentStore + ReferenceSource + ?Sized> ContentBackend for T {}
