//! engine::runner
//!
//! The replacement job: the single entry point for remapping a clone.
//!
//! # Lifecycle
//!
//! ```text
//! Created -> Indexing -> Walking -> Completed
//!               |           |
//!               v           v
//!             Failed      Failed
//! ```
//!
//! Preconditions are checked by [`ReplacementJob::new`], before anything
//! runs. Indexing always happens on the caller's thread, also for
//! [`ReplacementJob::start_async`], so the map is complete before the
//! scheduler ever sees the walk. A failed index mutates nothing.
//!
//! # Example
//!
//! ```
//! use relink::engine::{resolve_roots, FieldFilter, JobParams, JobState, ReplacementJob};
//! use relink::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! let store = InMemoryStore::new("master");
//! let a = store.add_root("a").unwrap();
//! let copies = store.add_root("copies").unwrap();
//! let copy = store.clone_subtree(&a, &copies, "a2").unwrap();
//!
//! let (source_root, copy_root) =
//!     resolve_roots(&store, &a.to_string(), &copy.to_string()).unwrap();
//! let job = ReplacementJob::new(
//!     Arc::new(store),
//!     JobParams { source_root, copy_root, deep: true, fields: FieldFilter::all() },
//! )
//! .unwrap();
//! let status = job.status();
//! job.start().unwrap();
//! assert_eq!(status.get(), JobState::Completed);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::core::node::Node;
use crate::core::types::NodeId;
use crate::store::{ContentBackend, ContentStore};

use super::audit::{AuditEvent, AuditSink, TracingAudit};
use super::index::{build_map, OriginToCloneMap};
use super::scheduler::{Scheduler, TenantContext, Work};
use super::walk::{walk, WalkContext};
use super::{JobError, JobParams, JobReport};

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Created,
    Indexing,
    Walking,
    Completed,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Created => write!(f, "created"),
            JobState::Indexing => write!(f, "indexing"),
            JobState::Walking => write!(f, "walking"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Shared view of a job's state. Clones observe the same job.
#[derive(Debug, Clone, Default)]
pub struct JobStatus(Arc<Mutex<JobState>>);

impl JobStatus {
    /// The current state.
    pub fn get(&self) -> JobState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: JobState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Remaps the references of one cloned subtree.
pub struct ReplacementJob<S: ContentBackend + ?Sized + 'static> {
    store: Arc<S>,
    params: JobParams,
    audit: Arc<dyn AuditSink>,
    status: JobStatus,
}

impl<S: ContentBackend + ?Sized + 'static> ReplacementJob<S> {
    /// Create a job over two already resolved roots.
    ///
    /// # Errors
    ///
    /// - `JobError::MismatchedStores` if the roots come from different stores
    /// - `JobError::ForeignNode` if they do not come from `store`
    pub fn new(store: Arc<S>, params: JobParams) -> Result<Self, JobError> {
        let source = &params.source_root;
        let copy = &params.copy_root;
        if source.store != copy.store {
            return Err(JobError::MismatchedStores {
                source_store: source.store.clone(),
                copy_store: copy.store.clone(),
            });
        }
        if source.store != store.name() {
            return Err(JobError::ForeignNode {
                path: source.path.clone(),
                store: source.store.clone(),
            });
        }

        Ok(Self {
            store,
            params,
            audit: Arc::new(TracingAudit),
            status: JobStatus::default(),
        })
    }

    /// Send audit records to `audit` instead of the tracing sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// The job's name, as submitted to a scheduler.
    pub fn name(&self) -> String {
        format!("relink:{}", self.params.copy_root.id)
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    /// A handle that keeps reporting this job's state.
    pub fn status(&self) -> JobStatus {
        self.status.clone()
    }

    /// Index and walk on the current thread.
    pub fn start(&self) -> Result<JobReport, JobError> {
        let map = self.index()?;
        self.run_walk(map)
    }

    /// Index on the current thread, then hand the walk to `scheduler`.
    ///
    /// Returns as soon as the walk is accepted. Walk failures are logged
    /// and recorded as `JobFailed` audit events.
    pub fn start_async(
        self,
        scheduler: &dyn Scheduler,
        tenant: &TenantContext,
    ) -> Result<(), JobError> {
        let map = self.index()?;
        let name = self.name();
        let store_name = self.store.name().to_string();
        let status = self.status.clone();
        let audit = Arc::clone(&self.audit);

        let work: Work = Box::new(move || {
            let name = self.name();
            if let Err(e) = self.run_walk(map) {
                tracing::error!(job = %name, "background job failed: {}", e);
            }
        });

        if let Err(e) = scheduler.submit(&name, work, tenant) {
            status.set(JobState::Failed);
            audit.record(AuditEvent::job_failed(&name, store_name, e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    fn index(&self) -> Result<OriginToCloneMap, JobError> {
        self.status.set(JobState::Indexing);
        build_map(&*self.store, &self.params.copy_root, self.params.deep)
            .map_err(|e| self.fail(e.into()))
    }

    fn run_walk(&self, map: OriginToCloneMap) -> Result<JobReport, JobError> {
        self.status.set(JobState::Walking);
        let mut ctx = WalkContext {
            store: &*self.store,
            map: &map,
            params: &self.params,
            audit: &*self.audit,
            report: JobReport {
                map_size: map.len(),
                duplicate_origins: map.duplicates(),
                ..JobReport::default()
            },
        };
        walk(&mut ctx, &self.params.source_root, &self.params.copy_root)
            .map_err(|e| self.fail(e))?;

        let report = ctx.report;
        self.status.set(JobState::Completed);
        tracing::info!(
            job = %self.name(),
            copy = %self.params.copy_root.path,
            rewritten = report.rewritten,
            unresolved = report.unresolved,
            "references relinked"
        );
        self.audit.record(AuditEvent::job_completed(
            self.name(),
            self.store.name(),
            report.clone(),
        ));
        Ok(report)
    }

    fn fail(&self, error: JobError) -> JobError {
        self.status.set(JobState::Failed);
        self.audit.record(AuditEvent::job_failed(
            self.name(),
            self.store.name(),
            error.to_string(),
        ));
        error
    }
}

/// Parse two node ids and resolve them in `store`.
///
/// # Errors
///
/// - `JobError::InvalidId` if either id does not parse
/// - `JobError::SourceMissing` / `JobError::CopyMissing` naming the store
pub fn resolve_roots<S: ContentStore + ?Sized>(
    store: &S,
    source: &str,
    copy: &str,
) -> Result<(Node, Node), JobError> {
    let source_id = NodeId::parse(source)?;
    let copy_id = NodeId::parse(copy)?;

    let source_root = store
        .get_node(&source_id)?
        .ok_or_else(|| JobError::SourceMissing {
            id: source_id,
            store: store.name().to_string(),
        })?;
    let copy_root = store
        .get_node(&copy_id)?
        .ok_or_else(|| JobError::CopyMissing {
            id: copy_id,
            store: store.name().to_string(),
        })?;
    Ok((source_root, copy_root))
}
