//! added command - Handle a node created from a branch template

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::json;

use super::{
    audit_sinks, completed_report, ensure_no_failure, print_json, print_report, with_scheduler,
    OpenStore,
};
use crate::cli::Context;
use crate::core::types::NodeId;
use crate::engine::{MemoryAudit, TenantContext};
use crate::store::ContentStore;
use crate::trigger::{CloneTrigger, TriggerOutcome};

/// Run the clone trigger for an added node.
pub fn added(
    ctx: &Context,
    store_path: &Path,
    node: &str,
    json: bool,
    audit_log: Option<&Path>,
) -> Result<()> {
    let open = OpenStore::open(store_path)?;
    let node_id = NodeId::parse(node).with_context(|| format!("Invalid node id '{node}'"))?;
    let trigger = CloneTrigger::from_config(&ctx.config)?;

    let memory = MemoryAudit::new();
    let audit = audit_sinks(&memory, audit_log)?;
    let tenant = TenantContext::new(ctx.config.site(), open.store.name());

    let outcome = with_scheduler(trigger.async_mode, |scheduler| {
        Ok(trigger.on_node_added(
            Arc::clone(&open.store),
            &node_id,
            scheduler,
            &tenant,
            audit,
        )?)
    });

    open.save()?;
    let outcome = outcome?;
    ensure_no_failure(&memory)?;

    let (label, report) = match outcome {
        TriggerOutcome::NotBranched => ("not_branched", None),
        TriggerOutcome::Completed(report) => ("completed", Some(report)),
        TriggerOutcome::Scheduled => ("scheduled", completed_report(&memory)),
    };

    if json {
        return print_json(&json!({
            "outcome": label,
            "report": report,
            "events": memory.events(),
        }));
    }
    match report {
        Some(report) => print_report(ctx, &report),
        None if !ctx.quiet => println!("Node {node_id} was not created from a branch template"),
        None => {}
    }
    Ok(())
}
