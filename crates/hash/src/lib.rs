//! Digest primitives for the AVL+ Merkle store.
//!
//! This crate defines the [`Hasher`] contract (spec §4.1): a small,
//! pluggable function table that binds leaf and inner node content to a
//! single fixed-width [`Digest`], plus the canonical LEB128 pre-image
//! encoding that every implementor must reproduce byte-for-byte to stay
//! compatible with digests produced elsewhere.

#![warn(rust_2018_idioms, unused_lifetimes)]
#![warn(unused_qualifications, missing_docs)]
#![warn(clippy::all, clippy::panic)]
#![forbid(unsafe_code, clippy::expect_used)]

mod digest;
mod hasher;
mod prefix;

pub use digest::{Digest, DigestError};
pub use hasher::{HashAlgorithm, Hasher, Sha256Hasher};
