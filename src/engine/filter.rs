//! engine::filter
//!
//! Decides which references of a clone must be repointed.

use std::collections::HashSet;

use crate::core::node::{FieldKind, Node, Reference};
use crate::core::types::NodeId;
use crate::store::{ContentStore, StoreError};

use super::FieldFilter;

/// Whether `reference` points into the source subtree.
///
/// True when the target exists and is either `source_root` itself or has
/// it among its parent chain. Ancestry follows parent ids, so siblings
/// sharing a name with the root stay outside.
pub fn needs_processing<S: ContentStore + ?Sized>(
    store: &S,
    reference: &Reference,
    source_root: &Node,
) -> Result<bool, StoreError> {
    let Some(target) = store.get_node(&reference.target)? else {
        return Ok(false);
    };
    descends_from(store, &target, &source_root.id)
}

/// Walk `node`'s parent chain looking for `ancestor`.
fn descends_from<S: ContentStore + ?Sized>(
    store: &S,
    node: &Node,
    ancestor: &NodeId,
) -> Result<bool, StoreError> {
    let mut seen = HashSet::new();
    let mut current = Some(node.id);
    let mut parent = node.parent;
    while let Some(id) = current {
        if id == *ancestor {
            return Ok(true);
        }
        // A parent cycle can only come from a corrupt store.
        if !seen.insert(id) {
            return Ok(false);
        }
        current = parent;
        parent = match current {
            Some(next) => store.get_node(&next)?.and_then(|n| n.parent),
            None => None,
        };
    }
    Ok(false)
}

/// Whether `reference` is a rewrite candidate at all.
///
/// Structural source-of-copy entries and version links are never
/// rewritten; other fields must pass `fields`.
pub fn is_candidate(reference: &Reference, fields: &FieldFilter) -> bool {
    fields.allows(&reference.field)
        && !reference.is_structural()
        && reference.kind != FieldKind::VersionLink
}
