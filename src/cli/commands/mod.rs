//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Opens the store file (locked, for mutating commands)
//! 2. Calls the engine or trigger
//! 3. Writes the store back and formats output
//!
//! # Async Commands
//!
//! `run --async` and `added` in async mode hand the walk to a
//! [`TokioScheduler`] on a runtime owned by the command, then wait for it
//! to drain before the store is written back.

mod added;
mod index;
mod refs;
mod run;

pub use added::added;
pub use index::index;
pub use refs::refs;
pub use run::run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use serde::Serialize;

use super::args::Command;
use super::Context;
use crate::core::node::Node;
use crate::core::types::NodeId;
use crate::engine::{
    AuditEvent, AuditSink, FanoutAudit, InlineScheduler, JobReport, JsonlAudit, MemoryAudit,
    Scheduler, TokioScheduler, TracingAudit,
};
use crate::store::file::{load_store, save_store, StoreLock};
use crate::store::{ContentStore, InMemoryStore};

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Run {
            store,
            source,
            copy,
            shallow,
            fields,
            async_mode,
            json,
            audit_log,
        } => run::run(
            ctx,
            &store,
            &source,
            &copy,
            shallow,
            &fields,
            async_mode,
            json,
            audit_log.as_deref(),
        ),
        Command::Added {
            store,
            node,
            json,
            audit_log,
        } => added::added(ctx, &store, &node, json, audit_log.as_deref()),
        Command::Index {
            store,
            copy,
            shallow,
            json,
        } => index::index(ctx, &store, &copy, shallow, json),
        Command::Refs { store, node, json } => refs::refs(ctx, &store, &node, json),
    }
}

/// A store file opened for a mutating command.
///
/// Holds the store lock until dropped.
struct OpenStore {
    store: Arc<InMemoryStore>,
    path: PathBuf,
    _lock: StoreLock,
}

impl OpenStore {
    fn open(path: &Path) -> Result<Self> {
        let lock = StoreLock::acquire(path)?;
        let store = load_store(path).context("Failed to load store")?;
        Ok(Self {
            store: Arc::new(store),
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    fn save(&self) -> Result<()> {
        save_store(&self.store, &self.path).context("Failed to save store")
    }
}

/// Resolve a node id given on the command line.
fn find_node(store: &InMemoryStore, raw: &str) -> Result<Node> {
    let id = NodeId::parse(raw).with_context(|| format!("Invalid node id '{raw}'"))?;
    store
        .get_node(&id)?
        .ok_or_else(|| anyhow!("Node {} not found in store '{}'", id, store.name()))
}

/// Audit sinks for a command: tracing, an in-memory copy for output, and
/// an optional JSON-lines file.
fn audit_sinks(memory: &MemoryAudit, audit_log: Option<&Path>) -> Result<Arc<dyn AuditSink>> {
    let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAudit), Arc::new(memory.clone())];
    if let Some(path) = audit_log {
        let file = JsonlAudit::open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        sinks.push(Arc::new(file));
    }
    Ok(Arc::new(FanoutAudit::new(sinks)))
}

/// Run `start` against an inline scheduler, or against a tokio scheduler
/// that is drained before returning.
fn with_scheduler<T>(
    async_mode: bool,
    start: impl FnOnce(&dyn Scheduler) -> Result<T>,
) -> Result<T> {
    if !async_mode {
        return start(&InlineScheduler);
    }
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let scheduler = TokioScheduler::new(runtime.handle().clone());
    let value = start(&scheduler)?;
    runtime.block_on(scheduler.drain())?;
    Ok(value)
}

/// The report of the last completed job, if any.
fn completed_report(memory: &MemoryAudit) -> Option<JobReport> {
    memory
        .events_of("job_completed")
        .into_iter()
        .rev()
        .find_map(|event| match event {
            AuditEvent::JobCompleted { report, .. } => Some(report),
            _ => None,
        })
}

/// Fail if any job recorded a failure.
fn ensure_no_failure(memory: &MemoryAudit) -> Result<()> {
    for event in memory.events_of("job_failed") {
        if let AuditEvent::JobFailed { job, reason, .. } = event {
            return Err(anyhow!("Job {job} failed: {reason}"));
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(ctx: &Context, report: &JobReport) {
    if ctx.quiet {
        return;
    }
    println!(
        "Relinked {} reference(s) in {} version group(s) across {} node(s)",
        report.rewritten, report.groups_committed, report.nodes_visited
    );
    if report.unresolved > 0 {
        println!(
            "{} reference(s) had no counterpart in the copy and were left unchanged",
            report.unresolved
        );
    }
}
