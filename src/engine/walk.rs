//! engine::walk
//!
//! Lockstep traversal of a source subtree and its clone.

use crate::core::node::Node;
use crate::store::ContentBackend;

use super::audit::AuditSink;
use super::group::group_and_dispatch;
use super::index::OriginToCloneMap;
use super::{JobError, JobParams, JobReport};

/// State shared by every step of one job run.
pub struct WalkContext<'a, S: ContentBackend + ?Sized> {
    pub store: &'a S,
    pub map: &'a OriginToCloneMap,
    pub params: &'a JobParams,
    pub audit: &'a dyn AuditSink,
    pub report: JobReport,
}

/// Process `copy` against `source`, then (when deep) each clone child
/// against the node its source-of-copy pointer resolves to.
///
/// Children without a resolvable pointer are skipped along with their
/// subtrees. Pre-order, depth first.
pub fn walk<S: ContentBackend + ?Sized>(
    ctx: &mut WalkContext<'_, S>,
    source: &Node,
    copy: &Node,
) -> Result<(), JobError> {
    ctx.report.nodes_visited += 1;
    tracing::debug!(source = %source.path, copy = %copy.path, "processing clone node");
    group_and_dispatch(ctx, source, copy)?;

    if !ctx.params.deep {
        return Ok(());
    }

    let store = ctx.store;
    for child in store.children(&copy.id)? {
        let Some(pointer) = child.source_of_copy else {
            tracing::debug!(copy = %child.path, "no source-of-copy pointer, skipping");
            continue;
        };
        let Some(counterpart) = store.get_node(&pointer)? else {
            tracing::debug!(
                copy = %child.path,
                pointer = %pointer,
                "source-of-copy pointer does not resolve, skipping"
            );
            continue;
        };
        walk(ctx, &counterpart, &child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::FieldValue;
    use crate::core::types::{FieldId, Language, NodeId, Version};
    use crate::engine::audit::MemoryAudit;
    use crate::engine::index::build_map;
    use crate::engine::FieldFilter;
    use crate::store::{ContentStore, InMemoryStore};

    fn en() -> Language {
        Language::new("en").unwrap()
    }

    fn run(store: &InMemoryStore, source: NodeId, copy: NodeId, deep: bool) -> JobReport {
        let params = JobParams {
            source_root: store.get_node(&source).unwrap().unwrap(),
            copy_root: store.get_node(&copy).unwrap().unwrap(),
            deep,
            fields: FieldFilter::all(),
        };
        let map = build_map(store, &params.copy_root, deep).unwrap();
        let audit = MemoryAudit::new();
        let mut ctx = WalkContext {
            store,
            map: &map,
            params: &params,
            audit: &audit,
            report: JobReport::default(),
        };
        walk(&mut ctx, &params.source_root, &params.copy_root).unwrap();
        ctx.report
    }

    #[test]
    fn deep_walk_visits_every_clone_node() {
        let store = InMemoryStore::new("master");
        let a = store.add_root("a").unwrap();
        let b = store.add_child(&a, "b").unwrap();
        store.add_child(&b, "c").unwrap();
        let copies = store.add_root("copies").unwrap();
        let copy = store.clone_subtree(&a, &copies, "a2").unwrap();

        assert_eq!(run(&store, a, copy, true).nodes_visited, 3);
        assert_eq!(run(&store, a, copy, false).nodes_visited, 1);
    }

    #[test]
    fn children_without_pointer_are_skipped() {
        let store = InMemoryStore::new("master");
        let a = store.add_root("a").unwrap();
        store.add_child(&a, "b").unwrap();
        let copies = store.add_root("copies").unwrap();
        let copy = store.clone_subtree(&a, &copies, "a2").unwrap();
        store.add_child(&copy, "added-later").unwrap();
        let dangling = store.add_child(&copy, "dangling").unwrap();
        store
            .modify(&dangling, |n| n.source_of_copy = Some(NodeId::generate()))
            .unwrap();

        // a2 and its clone of b only.
        assert_eq!(run(&store, a, copy, true).nodes_visited, 2);
    }

    #[test]
    fn descendant_links_are_rewritten_at_every_depth() {
        let store = InMemoryStore::new("master");
        let a = store.add_root("a").unwrap();
        let b = store.add_child(&a, "b").unwrap();
        let c = store.add_child(&b, "c").unwrap();
        let field = FieldId::generate();
        let v = store.add_version(&c, &en()).unwrap();
        store
            .set_field(&c, &en(), v, field, FieldValue::Link(Some(b)))
            .unwrap();
        let copies = store.add_root("copies").unwrap();
        let copy = store.clone_subtree(&a, &copies, "a2").unwrap();

        let report = run(&store, a, copy, true);
        assert_eq!(report.rewritten, 1);

        let b2 = store.children(&copy).unwrap()[0].id;
        let c2 = store.children(&b2).unwrap()[0].id;
        assert_eq!(
            store.field(&c2, &en(), Version::new(1), &field),
            Some(FieldValue::Link(Some(b2)))
        );
        // The original is unchanged.
        assert_eq!(
            store.field(&c, &en(), Version::new(1), &field),
            Some(FieldValue::Link(Some(b)))
        );
    }
}
