//! An immutable, content-addressed AVL+ Merkle tree.
//!
//! This crate implements the pure algorithms of spec components C2–C4: the
//! [`Node`] representation, the recursive insert/remove/rebalance
//! algorithms that never mutate an existing node, and the range/existence/
//! absence proof objects. It has no notion of versioning or a backing
//! store — those belong to `avl-store`, which drives this crate's pure
//! functions from a committed root and tracks what they orphan.
//!
//! Every operation here is a pure function over `Arc<Node>`: given the
//! same inputs it returns the same new root and the same set of displaced
//! (orphaned) node digests, never touching a node already constructed.

#![warn(rust_2018_idioms, unused_lifetimes)]
#![warn(unused_qualifications, missing_docs)]
#![warn(clippy::all, clippy::panic)]
#![forbid(clippy::expect_used)]

mod error;
mod node;
mod ops;
mod proof;
mod range_proof;

pub use error::TreeError;
pub use node::Node;
pub use ops::{balance, get, get_index, has, iterate, iterate_range, next, recursive_remove, recursive_set};
pub use proof::{ProofInner, ProofLeaf, Side};
pub use range_proof::{build_range, build_single, RangeProof};
