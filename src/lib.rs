//! relink - Rewrites cross-references inside cloned content subtrees
//!
//! When a subtree of a hierarchical content store is cloned, links inside
//! the clone still point at the original subtree. relink walks the clone
//! alongside its source and repoints every such link at the matching node
//! of the clone, leaving links to the rest of the store untouched.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - The replacement job: Index → Walk → Group → Filter → Rewrite
//! - [`trigger`] - Starts jobs for nodes created from branch templates
//! - [`store`] - Content store and reference index interfaces, plus an
//!   in-memory implementation with JSON persistence
//! - [`core`] - Domain types, node model, and configuration
//!
//! # Correctness Invariants
//!
//! 1. Only references into the source subtree are ever rewritten
//! 2. The origin-to-clone map is complete before the first rewrite
//! 3. Each language/version of a node is rewritten atomically
//! 4. A missing counterpart is reported, never guessed

pub mod cli;
pub mod core;
pub mod engine;
pub mod store;
pub mod trigger;
