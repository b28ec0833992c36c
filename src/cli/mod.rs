//! cli
//!
//! Command-line interface layer for relink.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and install logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap, loads the store
//! file, and hands the work to the [`crate::engine`] or
//! [`crate::trigger`]. Logs go to stderr; command output goes to stdout.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;

/// Settings shared by every command handler.
#[derive(Debug, Clone)]
pub struct Context {
    pub debug: bool,
    pub quiet: bool,
    pub config: Config,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config = Config::load(Some(cli.command.store()))
        .context("Failed to load configuration")?
        .config;
    init_logging(cli.debug, cli.quiet, config.log_level());

    let ctx = Context {
        debug: cli.debug,
        quiet: cli.quiet,
        config,
    };
    commands::dispatch(cli.command, &ctx)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the flags, which win over the configured level.
fn init_logging(debug: bool, quiet: bool, configured: &str) {
    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        configured
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
