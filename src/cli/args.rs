//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Only log warnings and errors

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// relink - Rewrites cross-references inside cloned content subtrees
#[derive(Parser, Debug)]
#[command(name = "relink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Repoint references inside a clone at the clone's own nodes
    #[command(
        name = "run",
        long_about = "Repoint references inside a clone at the clone's own nodes.\n\n\
            Every link in the copy that points into the source subtree is rewritten \
            to the corresponding node of the copy. Links to nodes outside the source \
            subtree are left alone. Links whose counterpart is missing from the copy \
            are reported and left alone.",
        after_help = "\
EXAMPLES:
    # Relink a whole cloned subtree
    relink run --store master.json --source {SOURCE-ID} --copy {COPY-ID}

    # Only the copy root, only one field
    relink run --store master.json --source {SOURCE-ID} --copy {COPY-ID} --shallow --field {FIELD-ID}

    # Machine-readable report plus an audit trail
    relink run --store master.json --source {SOURCE-ID} --copy {COPY-ID} --json --audit-log audit.jsonl"
    )]
    Run {
        /// Store file (JSON)
        #[arg(long, value_name = "FILE")]
        store: PathBuf,

        /// Id of the source subtree root
        #[arg(long, value_name = "ID")]
        source: String,

        /// Id of the cloned subtree root
        #[arg(long, value_name = "ID")]
        copy: String,

        /// Process the copy root only, not its descendants
        #[arg(long)]
        shallow: bool,

        /// Only rewrite references held in this field (repeatable)
        #[arg(long = "field", value_name = "FIELD_ID")]
        fields: Vec<String>,

        /// Run the walk on the background scheduler
        #[arg(long = "async")]
        async_mode: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Append audit records to this file as JSON lines
        #[arg(long, value_name = "FILE")]
        audit_log: Option<PathBuf>,
    },

    /// Handle a node having been added from a branch template
    #[command(
        name = "added",
        long_about = "Handle a node having been added from a branch template.\n\n\
            If the node was created from a branch template, the template's prototype \
            is used as the source and the node as the copy. Mode, depth and fields \
            come from the [trigger] section of the configuration."
    )]
    Added {
        /// Store file (JSON)
        #[arg(long, value_name = "FILE")]
        store: PathBuf,

        /// Id of the added node
        #[arg(long, value_name = "ID")]
        node: String,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,

        /// Append audit records to this file as JSON lines
        #[arg(long, value_name = "FILE")]
        audit_log: Option<PathBuf>,
    },

    /// Show the origin-to-clone map of a cloned subtree
    Index {
        /// Store file (JSON)
        #[arg(long, value_name = "FILE")]
        store: PathBuf,

        /// Id of the cloned subtree root
        #[arg(long, value_name = "ID")]
        copy: String,

        /// Index the copy root only
        #[arg(long)]
        shallow: bool,

        /// Print the map as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the outbound references of a node
    Refs {
        /// Store file (JSON)
        #[arg(long, value_name = "FILE")]
        store: PathBuf,

        /// Id of the node
        #[arg(long, value_name = "ID")]
        node: String,

        /// Print the references as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// The store file the command operates on.
    pub fn store(&self) -> &Path {
        match self {
            Command::Run { store, .. }
            | Command::Added { store, .. }
            | Command::Index { store, .. }
            | Command::Refs { store, .. } => store,
        }
    }
}
