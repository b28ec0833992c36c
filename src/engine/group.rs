//! engine::group
//!
//! Splits a clone node's references into (language, version) groups and
//! hands each group to the rewriter.

use std::collections::BTreeMap;

use crate::core::node::{Node, Reference};
use crate::core::types::{Language, Version};
use crate::store::ContentBackend;

use super::filter::{is_candidate, needs_processing};
use super::rewrite::rewrite_group;
use super::walk::WalkContext;
use super::JobError;

/// References of one language/version of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGroup {
    pub language: Language,
    pub version: Version,
    pub references: Vec<Reference>,
}

/// Group references by language, then version, in ascending order.
///
/// Reference order inside a group is preserved.
pub fn group_by_version(references: Vec<Reference>) -> Vec<VersionGroup> {
    let mut groups: BTreeMap<(Language, Version), Vec<Reference>> = BTreeMap::new();
    for reference in references {
        groups
            .entry((reference.language.clone(), reference.version))
            .or_default()
            .push(reference);
    }
    groups
        .into_iter()
        .map(|((language, version), references)| VersionGroup {
            language,
            version,
            references,
        })
        .collect()
}

/// Rewrite every qualifying reference of `copy`, one version group at a
/// time.
///
/// # Errors
///
/// Returns `JobError::IndexInconsistent` if a group names a version the
/// store cannot resolve; groups before it stay committed.
pub fn group_and_dispatch<S: ContentBackend + ?Sized>(
    ctx: &mut WalkContext<'_, S>,
    source: &Node,
    copy: &Node,
) -> Result<(), JobError> {
    let store = ctx.store;
    let mut qualifying = Vec::new();
    for reference in store.outbound_references(copy, true, true)? {
        if !is_candidate(&reference, &ctx.params.fields) {
            continue;
        }
        if needs_processing(store, &reference, &ctx.params.source_root)? {
            qualifying.push(reference);
        }
    }

    for group in group_by_version(qualifying) {
        let Some(target) = store.get_version(&copy.id, &group.language, group.version)? else {
            return Err(JobError::IndexInconsistent {
                path: copy.path.clone(),
                language: group.language,
                version: group.version,
                store: store.name().to_string(),
            });
        };
        rewrite_group(ctx, &group.references, source, &target)?;
    }
    Ok(())
}
