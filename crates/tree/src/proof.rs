use avl_hash::{Digest, Hasher};
use serde::{Deserialize, Serialize};

/// A revealed leaf within a proof (spec §4.4). Carries the leaf's value
/// digest rather than the value itself — a verifier checks a candidate
/// value by hashing it and comparing, it never needs the raw bytes here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofLeaf {
    /// The leaf's key.
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    /// `hasher.digest(value)`. Serialized under the field name `value`
    /// per spec §6's wire format note.
    #[serde(rename = "value")]
    pub value_digest: Digest,
    /// The version this leaf was created at.
    pub version: i64,
}

impl ProofLeaf {
    /// `hasher.leaf_digest(key, value_digest, version)`.
    pub fn digest(&self, hasher: &dyn Hasher) -> Digest {
        hasher.leaf_digest(&self.key, &self.value_digest, self.version)
    }
}

/// Which slot of an inner node the *sibling* digest in a [`ProofInner`]
/// occupies. `Left`: the sibling is the left child, so the path being
/// proven descends into the right child. `Right` is symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// The sibling is the left child; the proven path is the right child.
    Left,
    /// The sibling is the right child; the proven path is the left child.
    Right,
}

/// One step of a root-ward path (spec §4.4). A path to a leaf is an
/// ordered sequence of these, leaf-adjacent first and root-adjacent
/// last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofInner {
    /// The ancestor's height.
    pub height: u32,
    /// The ancestor's size.
    pub size: u64,
    /// The ancestor's version.
    pub version: i64,
    /// Which slot the sibling occupies.
    pub side: Side,
    /// The sibling subtree's digest. Serialized as `sideHash`.
    #[serde(rename = "sideHash")]
    pub sibling_digest: Digest,
}

/// Folds `leaf_digest` up through `path` (leaf-adjacent first) to
/// recompute the digest of the path's topmost ancestor. This is the
/// single-leaf primitive `COMPUTE_ROOT` builds on for the boundary path
/// and for each fork's sub-path.
pub fn recompute(hasher: &dyn Hasher, leaf_digest: Digest, path: &[ProofInner]) -> Digest {
    let mut h = leaf_digest;
    for step in path {
        h = match step.side {
            Side::Left => hasher.inner_digest(step.height, step.size, &step.sibling_digest, &h, step.version),
            Side::Right => hasher.inner_digest(step.height, step.size, &h, &step.sibling_digest, step.version),
        };
    }
    h
}

/// Whether every step of `path` takes the same `side` — used to detect
/// that a boundary leaf is the tree's global leftmost or rightmost leaf.
pub(crate) fn path_is_all(path: &[ProofInner], side: Side) -> bool {
    path.iter().all(|step| step.side == side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use avl_hash::Sha256Hasher;

    #[test]
    fn test_recompute_matches_direct_construction() {
        let h = Sha256Hasher;
        let left = Node::leaf(&h, b"a".to_vec(), b"1".to_vec(), 0);
        let right = Node::leaf(&h, b"b".to_vec(), b"2".to_vec(), 0);
        let inner = Node::inner(&h, b"b".to_vec(), left.clone(), right.clone(), 0);

        let path = vec![ProofInner {
            height: inner.height(),
            size: inner.size(),
            version: 0,
            side: Side::Left,
            sibling_digest: left.digest().clone(),
        }];
        let recomputed = recompute(&h, right.digest().clone(), &path);
        assert_eq!(&recomputed, inner.digest());
    }

    #[test]
    fn test_path_is_all() {
        let step = |side| ProofInner {
            height: 1,
            size: 2,
            version: 0,
            side,
            sibling_digest: Digest::from_bytes(vec![0; 32]),
        };
        assert!(path_is_all(&[step(Side::Left), step(Side::Left)], Side::Left));
        assert!(!path_is_all(&[step(Side::Left), step(Side::Right)], Side::Left));
        assert!(path_is_all(&[], Side::Left));
    }
}
