//! index command - Show the origin-to-clone map of a cloned subtree

use std::path::Path;

use anyhow::{Context as _, Result};
use serde_json::json;

use super::{find_node, print_json};
use crate::cli::Context;
use crate::engine::build_map;
use crate::store::file::load_store;

/// Print the map a replacement job would build for `copy`.
pub fn index(ctx: &Context, store_path: &Path, copy: &str, shallow: bool, json: bool) -> Result<()> {
    let store = load_store(store_path).context("Failed to load store")?;
    let copy_root = find_node(&store, copy)?;
    let map = build_map(&store, &copy_root, !shallow)?;

    if json {
        return print_json(&json!({
            "copy": copy_root.id,
            "path": copy_root.path,
            "entries": map.entries(),
            "duplicates": map.duplicates(),
        }));
    }

    for entry in map.entries() {
        println!("{} -> {}", entry.origin, entry.clone);
    }
    if !ctx.quiet {
        println!(
            "{} entr{} under {}",
            map.len(),
            if map.len() == 1 { "y" } else { "ies" },
            copy_root.path
        );
        if map.duplicates() > 0 {
            println!("{} duplicate origin id(s) ignored", map.duplicates());
        }
    }
    Ok(())
}
