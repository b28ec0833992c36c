//! refs command - List the outbound references of a node

use std::path::Path;

use anyhow::{Context as _, Result};

use super::{find_node, print_json};
use crate::cli::Context;
use crate::store::file::load_store;
use crate::store::ReferenceSource;

/// Print every reference `node` holds, across all versions.
pub fn refs(ctx: &Context, store_path: &Path, node: &str, json: bool) -> Result<()> {
    let store = load_store(store_path).context("Failed to load store")?;
    let node = find_node(&store, node)?;
    let references = store.outbound_references(&node, true, true)?;

    if json {
        return print_json(&references);
    }
    for reference in &references {
        let marker = if reference.is_structural() { " (source of copy)" } else { "" };
        println!("{reference}{marker}");
    }
    if !ctx.quiet && references.is_empty() {
        println!("{} has no outbound references", node.path);
    }
    Ok(())
}
