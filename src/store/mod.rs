//! store
//!
//! The content store and reference index the remapping job runs against.
//!
//! # Architecture
//!
//! The job depends only on the [`ContentStore`] and [`ReferenceSource`]
//! traits. A real deployment plugs in its own content database and link
//! index; this crate ships one implementation that covers both:
//!
//! - [`memory`]: In-memory store, doubling as the reference index, with
//!   fault injection and operation recording for tests
//! - [`file`]: JSON persistence and an exclusive lock for the CLI
//!
//! # Example
//!
//! ```
//! use relink::store::{ContentStore, InMemoryStore};
//!
//! let store = InMemoryStore::new("master");
//! let home = store.add_root("home").unwrap();
//! assert!(store.get_node(&home).unwrap().is_some());
//! ```

pub mod file;
pub mod memory;
mod traits;

pub use memory::{FailOn, InMemoryStore, StoreOperation, StoreSnapshot};
pub use traits::*;
