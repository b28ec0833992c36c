//! engine
//!
//! The reference-remapping job.
//!
//! # Architecture
//!
//! After a subtree is cloned, references inside the clone still point at
//! nodes of the original subtree. A [`ReplacementJob`] repoints them:
//!
//! ```text
//! index -> walk -> (per node) group -> filter -> rewrite
//! ```
//!
//! 1. **Index**: map each origin id in the clone to its clone id
//! 2. **Walk**: pair every source node with its clone, depth first
//! 3. **Group**: split the clone's references by language and version
//! 4. **Filter**: keep only references into the source subtree
//! 5. **Rewrite**: relink each kept reference inside one scoped edit
//!
//! # Invariants
//!
//! - Both roots come from the same store
//! - The map is complete before the first rewrite and never changes after
//! - Only targets equal to or below the source root are ever rewritten
//! - Each (language, version) group commits or cancels as a unit
//! - A reference without a clone counterpart is logged and left alone
//!
//! # Example
//!
//! ```
//! use relink::core::node::FieldValue;
//! use relink::core::types::{FieldId, Language, Version};
//! use relink::engine::{FieldFilter, JobParams, ReplacementJob};
//! use relink::store::{ContentStore, InMemoryStore};
//! use std::sync::Arc;
//!
//! let en = Language::new("en").unwrap();
//! let store = InMemoryStore::new("master");
//! let a = store.add_root("a").unwrap();
//! let b = store.add_child(&a, "b").unwrap();
//! let v = store.add_version(&a, &en).unwrap();
//! let link = FieldId::generate();
//! store.set_field(&a, &en, v, link, FieldValue::Link(Some(b))).unwrap();
//!
//! let copies = store.add_root("copies").unwrap();
//! let a2 = store.clone_subtree(&a, &copies, "a2").unwrap();
//!
//! let params = JobParams {
//!     source_root: store.get_node(&a).unwrap().unwrap(),
//!     copy_root: store.get_node(&a2).unwrap().unwrap(),
//!     deep: true,
//!     fields: FieldFilter::all(),
//! };
//! let report = ReplacementJob::new(Arc::new(store.clone()), params)
//!     .unwrap()
//!     .start()
//!     .unwrap();
//! assert_eq!(report.rewritten, 1);
//!
//! let b2 = store.children(&a2).unwrap()[0].id;
//! assert_eq!(store.field(&a2, &en, Version::new(1), &link), Some(FieldValue::Link(Some(b2))));
//! ```

pub mod audit;
pub mod filter;
pub mod group;
pub mod index;
pub mod rewrite;
pub mod runner;
pub mod scheduler;
pub mod walk;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::node::Node;
use crate::core::types::{FieldId, Language, NodeId, NodePath, TypeError, Version};
use crate::store::StoreError;

pub use audit::{AuditEvent, AuditSink, FanoutAudit, JsonlAudit, MemoryAudit, TracingAudit};
pub use index::{build_map, OriginToCloneMap};
pub use runner::{resolve_roots, JobState, JobStatus, ReplacementJob};
pub use scheduler::{InlineScheduler, Scheduler, SchedulerError, TenantContext, TokioScheduler};

/// Parameters of one replacement job.
#[derive(Debug, Clone)]
pub struct JobParams {
    /// Root of the original subtree.
    pub source_root: Node,
    /// Root of the clone.
    pub copy_root: Node,
    /// Process descendants, not just the roots.
    pub deep: bool,
    /// Fields whose references may be rewritten.
    pub fields: FieldFilter,
}

/// Restricts rewriting to a set of fields. Empty means every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldFilter(BTreeSet<FieldId>);

impl FieldFilter {
    /// A filter that allows every field.
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter that allows only `fields`.
    pub fn only(fields: impl IntoIterator<Item = FieldId>) -> Self {
        Self(fields.into_iter().collect())
    }

    pub fn allows(&self, field: &FieldId) -> bool {
        self.0.is_empty() || self.0.contains(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldId> {
        self.0.iter()
    }
}

/// Counters collected over one job run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Entries in the origin-to-clone map.
    pub map_size: usize,
    /// Origin ids seen more than once while indexing.
    pub duplicate_origins: usize,
    /// Source/clone pairs processed.
    pub nodes_visited: usize,
    /// Version groups committed.
    pub groups_committed: usize,
    /// References pointed at their clone counterpart.
    pub rewritten: usize,
    /// References left alone for lack of a counterpart.
    pub unresolved: usize,
}

/// Errors from a replacement job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The two roots were read from different stores.
    #[error("source root is in store '{source_store}' but copy root is in '{copy_store}'")]
    MismatchedStores {
        source_store: String,
        copy_store: String,
    },

    /// A root was read from a store other than the one the job runs on.
    #[error("{path} was read from store '{store}', not the job's store")]
    ForeignNode { path: NodePath, store: String },

    /// The source root id does not resolve.
    #[error("source root {id} not found in store '{store}'")]
    SourceMissing { id: NodeId, store: String },

    /// The copy root id does not resolve.
    #[error("copy root {id} not found in store '{store}'")]
    CopyMissing { id: NodeId, store: String },

    /// An identifier could not be parsed.
    #[error(transparent)]
    InvalidId(#[from] TypeError),

    /// The reference index names a version the store does not have.
    #[error("reference index lists {path} [{language}#{version}] which store '{store}' does not have")]
    IndexInconsistent {
        path: NodePath,
        language: Language,
        version: Version,
        store: String,
    },

    /// The reference index names a field the version does not contain.
    #[error("reference index lists field {field} on {path} [{language}#{version}] but the version has no such field")]
    FieldMissing {
        path: NodePath,
        field: FieldId,
        language: Language,
        version: Version,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl JobError {
    /// Whether the error was raised before anything could be mutated.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            JobError::MismatchedStores { .. }
                | JobError::ForeignNode { .. }
                | JobError::SourceMissing { .. }
                | JobError::CopyMissing { .. }
                | JobError::InvalidId(_)
        )
    }
}
