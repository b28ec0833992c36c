//! run command - Relink a cloned subtree against its source

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::json;

use super::{
    audit_sinks, completed_report, ensure_no_failure, print_json, print_report, with_scheduler,
    OpenStore,
};
use crate::cli::Context;
use crate::core::types::FieldId;
use crate::engine::{
    resolve_roots, FieldFilter, JobParams, MemoryAudit, ReplacementJob, TenantContext,
};
use crate::store::ContentStore;

/// Run a replacement job.
#[allow(clippy::too_many_arguments)]
pub fn run(
    ctx: &Context,
    store_path: &Path,
    source: &str,
    copy: &str,
    shallow: bool,
    fields: &[String],
    async_mode: bool,
    json: bool,
    audit_log: Option<&Path>,
) -> Result<()> {
    let open = OpenStore::open(store_path)?;
    let (source_root, copy_root) = resolve_roots(&*open.store, source, copy)?;
    let fields = fields
        .iter()
        .map(|raw| FieldId::parse(raw))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid --field")?;

    let params = JobParams {
        source_root,
        copy_root,
        deep: !shallow,
        fields: FieldFilter::only(fields),
    };
    let memory = MemoryAudit::new();
    let job = ReplacementJob::new(Arc::clone(&open.store), params)?
        .with_audit(audit_sinks(&memory, audit_log)?);
    let name = job.name();
    let status = job.status();
    let tenant = TenantContext::new(ctx.config.site(), open.store.name());

    let outcome = with_scheduler(async_mode, |scheduler| {
        if async_mode {
            job.start_async(scheduler, &tenant)?;
        } else {
            job.start()?;
        }
        Ok(())
    });

    // Groups committed before a failure stay committed.
    open.save()?;
    outcome?;
    ensure_no_failure(&memory)?;

    let report = completed_report(&memory).unwrap_or_default();
    if json {
        print_json(&json!({
            "job": name,
            "state": status.get(),
            "report": report,
            "events": memory.events(),
        }))
    } else {
        print_report(ctx, &report);
        Ok(())
    }
}
