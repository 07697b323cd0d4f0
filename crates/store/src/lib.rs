//! The versioned node store and user-facing tree facade (spec
//! components C5, C6).
//!
//! [`NodeStore`] is the abstract contract spec §4.5 describes: anything
//! satisfying it — [`MemoryNodeStore`] or, with the `sqlite` feature,
//! [`sqlite::SqliteNodeStore`] — can drive [`Tree`], the thin delegating
//! facade (C6) that embedding applications actually hold.

#![warn(rust_2018_idioms, unused_lifetimes)]
#![warn(unused_qualifications, missing_docs)]
#![warn(clippy::all, clippy::panic)]
#![forbid(clippy::expect_used)]

mod config;
mod error;
mod memory;
mod node_store;
#[cfg(feature = "sqlite")]
mod sqlite;
mod tree;

pub use config::{HashAlgorithm, StoreConfig};
pub use error::StoreError;
pub use memory::MemoryNodeStore;
pub use node_store::NodeStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteNodeStore;
pub use tree::Tree;
