//! core
//!
//! Core domain types, the node model, and configuration for relink.
//!
//! # Modules
//!
//! - [`types`] - Strong types: NodeId, FieldId, Language, Version, NodePath
//! - [`node`] - Nodes, field values, and references
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing

pub mod config;
pub mod node;
pub mod types;
