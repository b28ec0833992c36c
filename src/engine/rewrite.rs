//! engine::rewrite
//!
//! Repoints the references of one version group at their clone
//! counterparts.
//!
//! # Atomicity
//!
//! Every group is rewritten inside an [`EditScope`]. The scope commits on
//! [`EditScope::commit`] and cancels the store edit if it is dropped while
//! still open, so a group that fails half way leaves no partial writes.

use std::collections::BTreeMap;

use crate::core::node::{FieldValue, Node, Reference, VersionedNode};
use crate::core::types::{FieldId, Fingerprint, NodeId, VersionKey};
use crate::store::{ContentBackend, ContentStore, StoreError};

use super::audit::AuditEvent;
use super::walk::WalkContext;
use super::JobError;

/// A scoped edit of one version.
///
/// Holds a working copy of the version's fields. Changed fields are
/// written through to the store edit as they change.
///
/// Store edits are reentrant per version, so a scope opened inside an
/// edit someone else holds shares that edit. Dropping such a scope
/// without committing cancels the whole edit, outer levels included.
pub struct EditScope<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    key: VersionKey,
    fields: BTreeMap<FieldId, FieldValue>,
    open: bool,
}

impl<'a, S: ContentStore + ?Sized> EditScope<'a, S> {
    /// Open an edit of `version`.
    pub fn begin(store: &'a S, version: &VersionedNode) -> Result<Self, StoreError> {
        store.begin_edit(&version.key)?;
        Ok(Self {
            store,
            key: version.key.clone(),
            fields: version.fields.clone(),
            open: true,
        })
    }

    /// The version being edited.
    pub fn key(&self) -> &VersionKey {
        &self.key
    }

    /// Replace `old` with `new` in `field`.
    ///
    /// Returns `Ok(None)` if the version has no such field, otherwise
    /// whether the value changed.
    pub fn relink(
        &mut self,
        field: &FieldId,
        old: &NodeId,
        new: &NodeId,
    ) -> Result<Option<bool>, StoreError> {
        let Some(value) = self.fields.get_mut(field) else {
            return Ok(None);
        };
        if !value.relink(old, new) {
            return Ok(Some(false));
        }
        self.store.write_field(&self.key, field, value.clone())?;
        Ok(Some(true))
    }

    /// Persist the edit and return the fingerprint of the committed fields.
    pub fn commit(mut self) -> Result<Fingerprint, StoreError> {
        self.store.end_edit(&self.key)?;
        self.open = false;
        Ok(Fingerprint::of_fields(&self.fields))
    }
}

impl<S: ContentStore + ?Sized> Drop for EditScope<'_, S> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(e) = self.store.cancel_edit(&self.key) {
            tracing::warn!(key = %self.key, "failed to cancel edit: {}", e);
        }
    }
}

/// Rewrite one version group of the clone paired with `source`.
///
/// `references` must already be filtered to targets inside the source
/// subtree. Targets without a clone counterpart are logged, audited and
/// left as they are; the group still commits.
pub fn rewrite_group<S: ContentBackend + ?Sized>(
    ctx: &mut WalkContext<'_, S>,
    references: &[Reference],
    source: &Node,
    target: &VersionedNode,
) -> Result<(), JobError> {
    let store = ctx.store;
    let mut scope = EditScope::begin(store, target)?;
    let mut rewritten = 0;
    let mut unresolved = 0;

    for reference in references {
        let clone = match ctx.map.get(&reference.target) {
            Some(clone_id) => store.get_node(clone_id)?,
            None => None,
        };

        let Some(clone) = clone else {
            let expected = expected_clone_path(ctx, &reference.target)?;
            tracing::warn!(
                source = %source.path,
                expected = %expected,
                store = %store.name(),
                "cannot find corresponding clone for reference target"
            );
            ctx.audit.record(AuditEvent::rewrite_unresolved(
                store.name(),
                source.path.clone(),
                expected,
                reference.target,
            ));
            unresolved += 1;
            continue;
        };

        match scope.relink(&reference.field, &reference.target, &clone.id)? {
            Some(true) => rewritten += 1,
            // Either an earlier reference in the same field already relinked
            // it, or the index is stale and the value no longer holds it.
            Some(false) => tracing::debug!(
                node = %target.path,
                field = %reference.field,
                target = %reference.target,
                "reference target not present in field value"
            ),
            None => {
                return Err(JobError::FieldMissing {
                    path: target.path.clone(),
                    field: reference.field,
                    language: target.key.language.clone(),
                    version: target.key.version,
                })
            }
        }
    }

    let fingerprint = scope.commit()?;
    tracing::debug!(
        node = %target.path,
        key = %target.key,
        rewritten,
        unresolved,
        "committed version group"
    );

    ctx.report.groups_committed += 1;
    ctx.report.rewritten += rewritten;
    ctx.report.unresolved += unresolved;
    ctx.audit.record(AuditEvent::group_committed(
        store.name(),
        target.key.node,
        target.path.clone(),
        target.key.language.clone(),
        target.key.version,
        rewritten,
        fingerprint,
    ));
    Ok(())
}

/// Where the clone of `target` should sit: the copy root's path plus the
/// target's path below the source root.
fn expected_clone_path<S: ContentBackend + ?Sized>(
    ctx: &WalkContext<'_, S>,
    target: &NodeId,
) -> Result<String, StoreError> {
    let copy_root = &ctx.params.copy_root.path;
    let suffix = ctx
        .store
        .get_node(target)?
        .and_then(|node| {
            node.path
                .relative_to(&ctx.params.source_root.path)
                .map(str::to_string)
        })
        .unwrap_or_default();
    if copy_root.as_str() == "/" && suffix.starts_with('/') {
        return Ok(suffix);
    }
    Ok(format!("{copy_root}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::FieldKind;
    use crate::core::types::{Language, Version};
    use crate::engine::audit::MemoryAudit;
    use crate::engine::index::OriginToCloneMap;
    use crate::engine::{FieldFilter, JobParams, JobReport};
    use crate::store::{FailOn, InMemoryStore, StoreOperation};

    fn en() -> Language {
        Language::new("en").unwrap()
    }

    struct Fixture {
        store: InMemoryStore,
        params: JobParams,
        map: OriginToCloneMap,
        copy: NodeId,
        field: FieldId,
        b: NodeId,
        c: NodeId,
        b2: NodeId,
    }

    /// /a {b, c} cloned to /copies/a2 {b}; the copy links b and c.
    fn fixture() -> Fixture {
        let store = InMemoryStore::new("master");
        let a = store.add_root("a").unwrap();
        let b = store.add_child(&a, "b").unwrap();
        let c = store.add_child(&a, "c").unwrap();
        let copies = store.add_root("copies").unwrap();
        let copy = store.add_child(&copies, "a2").unwrap();
        let b2 = store.add_child(&copy, "b").unwrap();
        store.modify(&copy, |n| n.origin = Some(a)).unwrap();
        store.modify(&b2, |n| n.origin = Some(b)).unwrap();

        let field = FieldId::generate();
        let v = store.add_version(&copy, &en()).unwrap();
        store
            .set_field(&copy, &en(), v, field, FieldValue::Multilist(vec![b, c]))
            .unwrap();

        let mut map = OriginToCloneMap::new();
        map.insert(a, copy);
        map.insert(b, b2);

        let params = JobParams {
            source_root: store.get_node(&a).unwrap().unwrap(),
            copy_root: store.get_node(&copy).unwrap().unwrap(),
            deep: true,
            fields: FieldFilter::all(),
        };
        Fixture {
            store,
            params,
            map,
            copy,
            field,
            b,
            c,
            b2,
        }
    }

    fn reference(f: &Fixture, target: NodeId) -> Reference {
        Reference {
            source: f.copy,
            field: f.field,
            kind: FieldKind::Multilist,
            language: en(),
            version: Version::new(1),
            target,
        }
    }

    fn context<'a>(
        f: &'a Fixture,
        audit: &'a MemoryAudit,
    ) -> WalkContext<'a, InMemoryStore> {
        WalkContext {
            store: &f.store,
            map: &f.map,
            params: &f.params,
            audit,
            report: JobReport::default(),
        }
    }

    #[test]
    fn mapped_target_is_relinked_unmapped_left_alone() {
        let f = fixture();
        let audit = MemoryAudit::new();
        let mut ctx = context(&f, &audit);
        let version = f.store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();
        let refs = vec![reference(&f, f.b), reference(&f, f.c)];

        rewrite_group(&mut ctx, &refs, &f.params.source_root, &version).unwrap();

        assert_eq!(
            f.store.field(&f.copy, &en(), Version::new(1), &f.field),
            Some(FieldValue::Multilist(vec![f.b2, f.c]))
        );
        assert_eq!(ctx.report.rewritten, 1);
        assert_eq!(ctx.report.unresolved, 1);
        assert_eq!(ctx.report.groups_committed, 1);

        let unresolved = audit.events_of("rewrite_unresolved");
        assert_eq!(unresolved.len(), 1);
        match &unresolved[0] {
            AuditEvent::RewriteUnresolved {
                source_path,
                expected_path,
                store,
                ..
            } => {
                assert_eq!(source_path.as_str(), "/a");
                assert_eq!(expected_path, "/copies/a2/c");
                assert_eq!(store, "master");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(audit.events_of("group_committed").len(), 1);
    }

    #[test]
    fn all_unresolved_still_commits() {
        let f = fixture();
        let audit = MemoryAudit::new();
        let mut ctx = context(&f, &audit);
        let version = f.store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();

        rewrite_group(&mut ctx, &[reference(&f, f.c)], &f.params.source_root, &version).unwrap();

        let key = VersionKey::new(f.copy, en(), Version::new(1));
        assert!(f.store.operations().contains(&StoreOperation::Committed(key)));
        assert_eq!(ctx.report.rewritten, 0);
    }

    #[test]
    fn missing_field_is_fatal_and_cancels() {
        let f = fixture();
        let audit = MemoryAudit::new();
        let mut ctx = context(&f, &audit);
        let version = f.store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();
        let mut bogus = reference(&f, f.b);
        bogus.field = FieldId::generate();

        let err = rewrite_group(&mut ctx, &[bogus], &f.params.source_root, &version).unwrap_err();
        assert!(matches!(err, JobError::FieldMissing { .. }));

        let key = VersionKey::new(f.copy, en(), Version::new(1));
        let ops = f.store.operations();
        assert!(ops.contains(&StoreOperation::CancelEdit(key.clone())));
        assert!(!ops.contains(&StoreOperation::Committed(key)));
    }

    #[test]
    fn failed_write_leaves_group_untouched() {
        let f = fixture();
        let store = f
            .store
            .clone()
            .fail_on(FailOn::WriteField(StoreError::Backend("disk full".into())));
        let audit = MemoryAudit::new();
        let mut ctx = WalkContext {
            store: &store,
            map: &f.map,
            params: &f.params,
            audit: &audit,
            report: JobReport::default(),
        };
        let version = store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();

        let err = rewrite_group(&mut ctx, &[reference(&f, f.b)], &f.params.source_root, &version)
            .unwrap_err();
        assert!(matches!(err, JobError::Store(StoreError::Backend(_))));
        assert_eq!(
            store.field(&f.copy, &en(), Version::new(1), &f.field),
            Some(FieldValue::Multilist(vec![f.b, f.c]))
        );
        assert!(audit.events_of("group_committed").is_empty());
    }

    #[test]
    fn scope_dropped_without_commit_cancels() {
        let f = fixture();
        let version = f.store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();
        {
            let mut scope = EditScope::begin(&f.store, &version).unwrap();
            assert_eq!(scope.relink(&f.field, &f.b, &f.b2).unwrap(), Some(true));
        }
        assert_eq!(
            f.store.field(&f.copy, &en(), Version::new(1), &f.field),
            Some(FieldValue::Multilist(vec![f.b, f.c]))
        );
    }

    #[test]
    fn stale_reference_is_skipped_without_counting() {
        let f = fixture();
        let audit = MemoryAudit::new();
        let mut ctx = context(&f, &audit);
        // The value already points at b2, as if the index lagged behind.
        f.store
            .set_field(&f.copy, &en(), Version::new(1), f.field, FieldValue::Multilist(vec![f.b2]))
            .unwrap();
        let version = f.store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();

        rewrite_group(&mut ctx, &[reference(&f, f.b)], &f.params.source_root, &version).unwrap();

        assert_eq!(ctx.report.rewritten, 0);
        assert_eq!(ctx.report.unresolved, 0);
        assert_eq!(ctx.report.groups_committed, 1);
        assert_eq!(
            f.store.field(&f.copy, &en(), Version::new(1), &f.field),
            Some(FieldValue::Multilist(vec![f.b2]))
        );
    }

    #[test]
    fn nested_scope_drop_cancels_outer_edit() {
        let f = fixture();
        let version = f.store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();
        let mut outer = EditScope::begin(&f.store, &version).unwrap();
        outer.relink(&f.field, &f.b, &f.b2).unwrap();
        {
            let _inner = EditScope::begin(&f.store, &version).unwrap();
        }

        assert!(matches!(outer.commit(), Err(StoreError::NotEditing(_))));
        assert_eq!(
            f.store.field(&f.copy, &en(), Version::new(1), &f.field),
            Some(FieldValue::Multilist(vec![f.b, f.c]))
        );
    }

    #[test]
    fn commit_fingerprint_matches_stored_content() {
        let f = fixture();
        let version = f.store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();
        let mut scope = EditScope::begin(&f.store, &version).unwrap();
        scope.relink(&f.field, &f.b, &f.b2).unwrap();
        let fingerprint = scope.commit().unwrap();

        let stored = f.store.get_version(&f.copy, &en(), Version::UNSET).unwrap().unwrap();
        assert_eq!(fingerprint, Fingerprint::of_fields(&stored.fields));
    }
}
