//! engine::scheduler
//!
//! Runs named units of work on behalf of a tenant.
//!
//! # Implementations
//!
//! - [`InlineScheduler`]: runs work immediately on the caller's thread
//! - [`TokioScheduler`]: runs work on a tokio blocking pool and lets the
//!   host wait for everything submitted with [`TokioScheduler::drain`]
//!
//! Work carries its own error handling; a scheduler only reports failure
//! to accept work or work that panicked.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A unit of background work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// The site and store a unit of work runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub site: String,
    pub store: String,
}

impl TenantContext {
    pub fn new(site: impl Into<String>, store: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            store: store.into(),
        }
    }
}

/// Errors from a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No runtime is available to run work on.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    /// Submitted work panicked.
    #[error("job '{0}' panicked")]
    WorkPanicked(String),

    /// Submitted work was cancelled before it finished.
    #[error("job '{0}' was cancelled")]
    WorkCancelled(String),
}

/// Accepts named units of work.
pub trait Scheduler: Send + Sync {
    /// Submit `work` under `job_name` for `tenant`.
    ///
    /// Returns once the work is accepted, which for some schedulers is
    /// after it has run.
    fn submit(&self, job_name: &str, work: Work, tenant: &TenantContext)
        -> Result<(), SchedulerError>;
}

/// Runs work synchronously at submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn submit(
        &self,
        job_name: &str,
        work: Work,
        tenant: &TenantContext,
    ) -> Result<(), SchedulerError> {
        let span = tracing::info_span!("job", job = %job_name, site = %tenant.site, store = %tenant.store);
        let _enter = span.enter();
        work();
        Ok(())
    }
}

/// Runs work on a tokio runtime's blocking pool.
///
/// Handles of finished work are dropped on every submit, so a host that
/// never drains does not accumulate them. Panics are caught inside the
/// task and kept until the next [`TokioScheduler::drain`].
pub struct TokioScheduler {
    handle: Handle,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
    failures: Arc<Mutex<Vec<SchedulerError>>>,
}

impl TokioScheduler {
    /// Schedule onto the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(Vec::new()),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Schedule onto the runtime the caller is running in.
    pub fn current() -> Result<Self, SchedulerError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| SchedulerError::NoRuntime(e.to_string()))
    }

    /// Number of submitted units still queued or running.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|(_, task)| !task.is_finished());
        tasks.len()
    }

    /// Wait for everything submitted so far.
    ///
    /// Every unit is awaited even if an earlier one failed; the first
    /// failure is returned.
    pub async fn drain(&self) -> Result<(), SchedulerError> {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let mut first_error = None;
        for (name, task) in tasks {
            if let Err(e) = task.await {
                let error = if e.is_panic() {
                    SchedulerError::WorkPanicked(name)
                } else {
                    SchedulerError::WorkCancelled(name)
                };
                tracing::error!("{}", error);
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        let failures =
            std::mem::take(&mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner));
        match failures.into_iter().next().or(first_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn submit(
        &self,
        job_name: &str,
        work: Work,
        tenant: &TenantContext,
    ) -> Result<(), SchedulerError> {
        let span = tracing::info_span!("job", job = %job_name, site = %tenant.site, store = %tenant.store);
        let failures = Arc::clone(&self.failures);
        let name = job_name.to_string();
        let task = self.handle.spawn_blocking(move || {
            let _enter = span.enter();
            if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                let error = SchedulerError::WorkPanicked(name);
                tracing::error!("{}", error);
                failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(error);
            }
        });
        tracing::debug!(job = %job_name, "submitted background job");
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|(_, task)| !task.is_finished());
        tasks.push((job_name.to_string(), task));
        Ok(())
    }
}
