//! trigger
//!
//! Reacts to a node being added from a branch template by remapping the
//! references of the freshly created subtree.
//!
//! # Flow
//!
//! 1. Resolve the added node; nodes not created from a template are ignored
//! 2. Resolve the template, which must have exactly one child (the prototype)
//! 3. Run a deep replacement job from the prototype onto the added node,
//!    inline or through the scheduler

use std::sync::Arc;

use thiserror::Error;

use crate::core::config::{Config, ConfigError};
use crate::core::node::Node;
use crate::core::types::{FieldId, NodeId, NodePath, TypeError};
use crate::engine::{
    AuditSink, FieldFilter, JobError, JobParams, JobReport, ReplacementJob, Scheduler,
    TenantContext,
};
use crate::store::{ContentBackend, StoreError};

/// Errors from handling an added node.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("added node {id} not found in store '{store}'")]
    NodeMissing { id: NodeId, store: String },

    #[error("branch template {id} of {path} not found in store '{store}'")]
    TemplateMissing {
        id: NodeId,
        path: NodePath,
        store: String,
    },

    #[error("branch template {0} is malformed: it must have exactly one child")]
    MalformedBranch(NodePath),

    #[error("invalid trigger setting: {0}")]
    InvalidSetting(#[from] TypeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// What handling an added node did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The node was not created from a branch template.
    NotBranched,
    /// The job ran inline.
    Completed(JobReport),
    /// The job was handed to the scheduler.
    Scheduled,
}

/// Settings for jobs started by node additions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneTrigger {
    pub async_mode: bool,
    pub deep: bool,
    pub fields: FieldFilter,
}

impl Default for CloneTrigger {
    fn default() -> Self {
        Self {
            async_mode: false,
            deep: true,
            fields: FieldFilter::all(),
        }
    }
}

impl CloneTrigger {
    /// Settings from the `[trigger]` config section.
    pub fn from_config(config: &Config) -> Result<Self, TriggerError> {
        Ok(Self {
            async_mode: config.trigger_async(),
            deep: config.trigger_deep(),
            fields: FieldFilter::only(config.trigger_fields()?),
        })
    }

    /// Settings from raw handler parameters.
    ///
    /// `async_flag` is on only for `"true"` in any case; `fields` is a
    /// comma-separated list of field ids. Always deep.
    ///
    /// # Example
    ///
    /// ```
    /// use relink::trigger::CloneTrigger;
    ///
    /// let trigger = CloneTrigger::from_raw("TRUE", "").unwrap();
    /// assert!(trigger.async_mode);
    /// assert!(trigger.fields.is_empty());
    /// assert!(!CloneTrigger::from_raw("yes", "").unwrap().async_mode);
    /// ```
    pub fn from_raw(async_flag: &str, fields: &str) -> Result<Self, TriggerError> {
        Ok(Self {
            async_mode: async_flag.eq_ignore_ascii_case("true"),
            deep: true,
            fields: FieldFilter::only(FieldId::parse_list(fields)?),
        })
    }

    /// Handle `node_id` having been added to `store`.
    pub fn on_node_added<S: ContentBackend + ?Sized + 'static>(
        &self,
        store: Arc<S>,
        node_id: &NodeId,
        scheduler: &dyn Scheduler,
        tenant: &TenantContext,
        audit: Arc<dyn AuditSink>,
    ) -> Result<TriggerOutcome, TriggerError> {
        let node = store
            .get_node(node_id)?
            .ok_or_else(|| TriggerError::NodeMissing {
                id: *node_id,
                store: store.name().to_string(),
            })?;

        let Some(template_id) = node.branch else {
            tracing::debug!(node = %node.path, "not created from a branch template");
            return Ok(TriggerOutcome::NotBranched);
        };
        let template = store
            .get_node(&template_id)?
            .ok_or_else(|| TriggerError::TemplateMissing {
                id: template_id,
                path: node.path.clone(),
                store: store.name().to_string(),
            })?;
        let prototype = single_child(&*store, &template)?;

        tracing::debug!(
            node = %node.path,
            prototype = %prototype.path,
            async_mode = self.async_mode,
            "relinking node created from branch template"
        );
        let job = ReplacementJob::new(
            store,
            JobParams {
                source_root: prototype,
                copy_root: node,
                deep: self.deep,
                fields: self.fields.clone(),
            },
        )?
        .with_audit(audit);

        if self.async_mode {
            job.start_async(scheduler, tenant)?;
            Ok(TriggerOutcome::Scheduled)
        } else {
            Ok(TriggerOutcome::Completed(job.start()?))
        }
    }
}

fn single_child<S: ContentBackend + ?Sized>(store: &S, template: &Node) -> Result<Node, TriggerError> {
    let mut children = store.children(&template.id)?;
    if children.len() != 1 {
        return Err(TriggerError::MalformedBranch(template.path.clone()));
    }
    children
        .pop()
        .ok_or_else(|| TriggerError::MalformedBranch(template.path.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::FieldValue;
    use crate::core::types::{Language, Version};
    use crate::engine::{InlineScheduler, MemoryAudit};
    use crate::store::{ContentStore, InMemoryStore};

    fn en() -> Language {
        Language::new("en").unwrap()
    }

    fn tenant() -> TenantContext {
        TenantContext::new("website", "master")
    }

    /// A branch template whose prototype `$name {b}` links to `b`, and a
    /// node created from it under /content.
    fn branched() -> (InMemoryStore, NodeId, FieldId) {
        let store = InMemoryStore::new("master");
        let templates = store.add_root("templates").unwrap();
        let template = store.add_child(&templates, "page-branch").unwrap();
        let prototype = store.add_child(&template, "$name").unwrap();
        let b = store.add_child(&prototype, "b").unwrap();
        let field = FieldId::generate();
        let v = store.add_version(&prototype, &en()).unwrap();
        store
            .set_field(&prototype, &en(), v, field, FieldValue::Link(Some(b)))
            .unwrap();

        let content = store.add_root("content").unwrap();
        let page = store.clone_subtree(&prototype, &content, "page").unwrap();
        store.modify(&page, |n| n.branch = Some(template)).unwrap();
        (store, page, field)
    }

    #[test]
    fn raw_settings_parse_field_list() {
        let trigger = CloneTrigger::from_raw(
            "false",
            "{19B597D3-2EDD-4AE2-AEFE-4A94C7F10E31},110d559f-dea5-42ea-9c1c-8a5df7e70ef9",
        )
        .unwrap();
        assert!(!trigger.async_mode);
        assert!(trigger.deep);
        assert_eq!(trigger.fields.iter().count(), 2);
        assert!(matches!(
            CloneTrigger::from_raw("true", "nope"),
            Err(TriggerError::InvalidSetting(_))
        ));
    }

    #[test]
    fn branched_node_is_relinked_inline() {
        let (store, page, field) = branched();
        let outcome = CloneTrigger::default()
            .on_node_added(
                Arc::new(store.clone()),
                &page,
                &InlineScheduler,
                &tenant(),
                Arc::new(MemoryAudit::new()),
            )
            .unwrap();

        let report = match outcome {
            TriggerOutcome::Completed(report) => report,
            other => panic!("expected an inline run, got {other:?}"),
        };
        assert_eq!(report.rewritten, 1);
        let b2 = store.children(&page).unwrap()[0].id;
        assert_eq!(
            store.field(&page, &en(), Version::new(1), &field),
            Some(FieldValue::Link(Some(b2)))
        );
    }

    #[test]
    fn async_mode_schedules() {
        let (store, page, field) = branched();
        let trigger = CloneTrigger {
            async_mode: true,
            ..CloneTrigger::default()
        };
        let audit = MemoryAudit::new();
        let outcome = trigger
            .on_node_added(
                Arc::new(store.clone()),
                &page,
                &InlineScheduler,
                &tenant(),
                Arc::new(audit.clone()),
            )
            .unwrap();

        assert_eq!(outcome, TriggerOutcome::Scheduled);
        assert_eq!(audit.events_of("job_completed").len(), 1);
        let b2 = store.children(&page).unwrap()[0].id;
        assert_eq!(
            store.field(&page, &en(), Version::new(1), &field),
            Some(FieldValue::Link(Some(b2)))
        );
    }

    #[test]
    fn plain_node_is_ignored() {
        let store = InMemoryStore::new("master");
        let node = store.add_root("plain").unwrap();
        let outcome = CloneTrigger::default()
            .on_node_added(
                Arc::new(store.clone()),
                &node,
                &InlineScheduler,
                &tenant(),
                Arc::new(MemoryAudit::new()),
            )
            .unwrap();
        assert_eq!(outcome, TriggerOutcome::NotBranched);
        assert!(store.operations().is_empty());
    }

    #[test]
    fn template_with_two_children_is_malformed() {
        let (store, page, _) = branched();
        let template = store.get_node(&page).unwrap().unwrap().branch.unwrap();
        store.add_child(&template, "second").unwrap();

        let err = CloneTrigger::default()
            .on_node_added(
                Arc::new(store.clone()),
                &page,
                &InlineScheduler,
                &tenant(),
                Arc::new(MemoryAudit::new()),
            )
            .unwrap_err();
        match err {
            TriggerError::MalformedBranch(path) => {
                assert_eq!(path.as_str(), "/templates/page-branch")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_node_and_template_are_reported() {
        let (store, page, _) = branched();
        let store = Arc::new(store);
        let missing = NodeId::generate();

        let err = CloneTrigger::default()
            .on_node_added(
                Arc::clone(&store),
                &missing,
                &InlineScheduler,
                &tenant(),
                Arc::new(MemoryAudit::new()),
            )
            .unwrap_err();
        assert!(matches!(err, TriggerError::NodeMissing { .. }));

        store.modify(&page, |n| n.branch = Some(missing)).unwrap();
        let err = CloneTrigger::default()
            .on_node_added(
                Arc::clone(&store),
                &page,
                &InlineScheduler,
                &tenant(),
                Arc::new(MemoryAudit::new()),
            )
            .unwrap_err();
        assert!(matches!(err, TriggerError::TemplateMissing { .. }));
    }
}
