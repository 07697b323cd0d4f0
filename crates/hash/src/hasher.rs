use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::digest::Digest;
use crate::prefix::PreimageWriter;

/// Identifies which digest function produced a [`Digest`].
///
/// Kept as an enum (rather than erasing the algorithm entirely) so a
/// future second algorithm can be added without breaking callers that
/// match on it — the same forward-compatible shape as
/// `warg_crypto::hash::HashAlgorithm`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum HashAlgorithm {
    /// SHA-256, the default and only algorithm this crate ships.
    Sha256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// The digest function contract (spec §4.1).
///
/// Three pure functions over byte input. `leaf_digest` and `inner_digest`
/// encode their arguments into the canonical pre-image described in
/// spec §4.1 before delegating to `digest`, so a correct implementor only
/// needs to get `digest` right to be wire-compatible with any other.
pub trait Hasher: Send + Sync {
    /// Which algorithm this hasher implements.
    fn algorithm(&self) -> HashAlgorithm;

    /// Hashes an arbitrary byte string.
    fn digest(&self, bytes: &[u8]) -> Digest;

    /// The digest of an empty node: `H(∅)`.
    fn empty_digest(&self) -> Digest {
        self.digest(&[])
    }

    /// The digest of a leaf carrying `key`, whose value hashes to
    /// `value_digest`, created at `version`.
    ///
    /// Pre-image: `int8(0) || varint(1) || varint(version) ||
    /// length_prefixed(key) || length_prefixed(value_digest)`.
    fn leaf_digest(&self, key: &[u8], value_digest: &Digest, version: i64) -> Digest {
        let mut w = PreimageWriter::new();
        w.write_int8(0)
            .write_varint(1)
            .write_version(version)
            .write_length_prefixed(key)
            .write_length_prefixed(value_digest.as_bytes());
        self.digest(&w.into_bytes())
    }

    /// The digest of an inner node of the given `height` and `size`,
    /// created at `version`, binding its children's digests.
    ///
    /// Pre-image: `int8(height) || varint(size) || varint(version) ||
    /// length_prefixed(left_digest) || length_prefixed(right_digest)`.
    ///
    /// `height` is truncated to a single byte per spec §4.1's `int8`; an
    /// AVL+ tree over a realistic key set never approaches height 255
    /// (not reachable without exceeding tree size limits inherent to a
    /// 64-bit size field), so this is not a practical restriction.
    fn inner_digest(
        &self,
        height: u32,
        size: u64,
        left_digest: &Digest,
        right_digest: &Digest,
        version: i64,
    ) -> Digest {
        let mut w = PreimageWriter::new();
        w.write_int8(height as u8)
            .write_varint(size)
            .write_version(version)
            .write_length_prefixed(left_digest.as_bytes())
            .write_length_prefixed(right_digest.as_bytes());
        self.digest(&w.into_bytes())
    }
}

/// The default [`Hasher`]: SHA-256, 32-byte digests.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    fn digest(&self, bytes: &[u8]) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Digest::from_bytes(hasher.finalize().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_digest_is_32_bytes() {
        let hasher = Sha256Hasher;
        assert_eq!(hasher.empty_digest().len(), 32);
    }

    #[test]
    fn test_leaf_digest_is_deterministic() {
        let hasher = Sha256Hasher;
        let value_digest = hasher.digest(b"value");
        let a = hasher.leaf_digest(b"key", &value_digest, 0);
        let b = hasher.leaf_digest(b"key", &value_digest, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_leaf_digest_depends_on_version() {
        // Why encode version into the digest: replaying identical
        // (key, value) pairs across versions must not collide.
        let hasher = Sha256Hasher;
        let value_digest = hasher.digest(b"value");
        let a = hasher.leaf_digest(b"key", &value_digest, 0);
        let b = hasher.leaf_digest(b"key", &value_digest, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_inner_digest_depends_on_child_order() {
        let hasher = Sha256Hasher;
        let left = hasher.digest(b"left");
        let right = hasher.digest(b"right");
        let a = hasher.inner_digest(1, 2, &left, &right, 0);
        let b = hasher.inner_digest(1, 2, &right, &left, 0);
        assert_ne!(a, b);
    }
}
