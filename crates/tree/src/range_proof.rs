use std::sync::Arc;

use avl_hash::{Digest, Hasher};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::node::Node;
use crate::proof::{path_is_all, recompute, ProofInner, ProofLeaf, Side};

/// A proof that a tree's committed root contains (or cannot contain) a
/// contiguous run of leaves (spec §4.4). Covers both a single-key proof
/// (`leaves.len() == 1`, `inner_paths` empty) and a genuine range proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeProof {
    left_path: Vec<ProofInner>,
    inner_paths: Vec<Vec<ProofInner>>,
    leaves: Vec<ProofLeaf>,
    #[serde(skip)]
    derived: OnceCell<Derived>,
}

#[derive(Debug, Clone)]
struct Derived {
    root_digest: Digest,
    tree_end: bool,
    left_index: i64,
}

/// Walks `leaves`/`inner_paths` in lockstep with the path-folding loop,
/// so the fork trigger (spec §4.4: "the next inner-path and next leaf
/// must be consumed") and the leftover-input check share one cursor.
struct Cursor<'a> {
    leaves: &'a [ProofLeaf],
    inner_paths: &'a [Vec<ProofInner>],
    next_leaf: usize,
    next_path: usize,
}

impl<'a> Cursor<'a> {
    fn new(leaves: &'a [ProofLeaf], inner_paths: &'a [Vec<ProofInner>]) -> Self {
        Cursor { leaves, inner_paths, next_leaf: 1, next_path: 0 }
    }

    fn exhausted(&self) -> bool {
        self.next_leaf >= self.leaves.len()
    }

    fn take(&mut self, hasher: &dyn Hasher) -> Result<(Digest, &'a [ProofInner]), TreeError> {
        let leaf = self
            .leaves
            .get(self.next_leaf)
            .ok_or_else(|| TreeError::MalformedProof("fork with no leaf to consume".into()))?;
        let path = self
            .inner_paths
            .get(self.next_path)
            .ok_or_else(|| TreeError::MalformedProof("fork with no inner path to consume".into()))?;
        self.next_leaf += 1;
        self.next_path += 1;
        Ok((leaf.digest(hasher), path))
    }
}

impl RangeProof {
    /// Assembles a proof from its three wire fields.
    pub fn new(left_path: Vec<ProofInner>, inner_paths: Vec<Vec<ProofInner>>, leaves: Vec<ProofLeaf>) -> Self {
        RangeProof { left_path, inner_paths, leaves, derived: OnceCell::new() }
    }

    /// The revealed leaves, in ascending key order.
    pub fn leaves(&self) -> &[ProofLeaf] {
        &self.leaves
    }

    fn derive(&self, hasher: &dyn Hasher) -> Result<&Derived, TreeError> {
        self.derived.get_or_try_init(|| compute_root(hasher, &self.left_path, &self.inner_paths, &self.leaves))
    }

    /// `COMPUTE_ROOT`'s re-derived root digest, computed once and cached.
    pub fn root_digest(&self, hasher: &dyn Hasher) -> Result<Digest, TreeError> {
        self.derive(hasher).map(|d| d.root_digest.clone())
    }

    /// True iff the last leaf is the tree's rightmost leaf.
    pub fn tree_end(&self, hasher: &dyn Hasher) -> Result<bool, TreeError> {
        self.derive(hasher).map(|d| d.tree_end)
    }

    /// In-order index of the first leaf; `-1` if `left_path` is empty.
    pub fn left_index(&self, hasher: &dyn Hasher) -> Result<i64, TreeError> {
        self.derive(hasher).map(|d| d.left_index)
    }

    /// Equality of the re-derived root and `root`.
    pub fn verify(&self, hasher: &dyn Hasher, root: &Digest) -> Result<bool, TreeError> {
        Ok(&self.root_digest(hasher)? == root)
    }

    /// Confirms `key` maps to `value` under `root`.
    pub fn verify_item(&self, hasher: &dyn Hasher, root: &Digest, key: &[u8], value: &[u8]) -> Result<(), TreeError> {
        if !self.verify(hasher, root)? {
            tracing::warn!(key = %hex::encode(key), "proof root mismatch during verify_item");
            return Err(TreeError::RootMismatch);
        }
        let leaf = self.leaves.iter().find(|l| l.key == key).ok_or_else(|| {
            tracing::warn!(key = %hex::encode(key), "key not present in proof's leaves");
            TreeError::KeyNotInProof
        })?;
        if leaf.value_digest != hasher.digest(value) {
            tracing::warn!(key = %hex::encode(key), "proof leaf's value digest does not match candidate value");
            return Err(TreeError::ValueDigestMismatch);
        }
        Ok(())
    }

    /// Confirms `key` is absent under `root` (spec §4.4 rules 1-4).
    pub fn verify_absence(&self, hasher: &dyn Hasher, root: &Digest, key: &[u8]) -> Result<(), TreeError> {
        if !self.verify(hasher, root)? {
            tracing::warn!(key = %hex::encode(key), "proof root mismatch during verify_absence");
            return Err(TreeError::RootMismatch);
        }
        if self.leaves.is_empty() {
            return Err(TreeError::EmptyProof);
        }

        if let Some(index) = self.leaves.iter().position(|l| l.key == key) {
            tracing::warn!(key = %hex::encode(key), index, "absence disproved: key is present in proof");
            return Err(TreeError::AbsenceDisproved(index as u64));
        }

        let first = &self.leaves[0];
        let Some(last) = self.leaves.last() else {
            unreachable!("checked non-empty above")
        };

        if key < first.key.as_slice() {
            if path_is_all(&self.left_path, Side::Right) {
                return Ok(());
            }
            let reason = "key precedes the proof's first leaf, which is not the tree's leftmost leaf";
            tracing::warn!(key = %hex::encode(key), reason, "absence not proven");
            return Err(TreeError::AbsenceNotProven(reason.into()));
        }

        if key > last.key.as_slice() {
            if self.left_path.is_empty()
                || path_is_all(&self.left_path, Side::Left)
                || self.tree_end(hasher)?
            {
                return Ok(());
            }
            let reason = "key follows the proof's last leaf, which does not reach the tree's end";
            tracing::warn!(key = %hex::encode(key), reason, "absence not proven");
            return Err(TreeError::AbsenceNotProven(reason.into()));
        }

        let gap = self
            .leaves
            .windows(2)
            .any(|pair| pair[0].key.as_slice() < key && key < pair[1].key.as_slice());
        if gap {
            Ok(())
        } else {
            tracing::warn!(key = %hex::encode(key), "no gap in proof's leaves straddles key, absence not proven");
            Err(TreeError::AbsenceNotProven(format!(
                "no gap in the proof's leaves straddles key {key:?}"
            )))
        }
    }
}

fn compute_root(
    hasher: &dyn Hasher,
    left_path: &[ProofInner],
    inner_paths: &[Vec<ProofInner>],
    leaves: &[ProofLeaf],
) -> Result<Derived, TreeError> {
    if leaves.is_empty() {
        return Err(TreeError::EmptyProof);
    }

    let mut cursor = Cursor::new(leaves, inner_paths);
    let mut rightmost = true;
    let seed = leaves[0].digest(hasher);
    let root_digest = fold(hasher, seed, left_path, &mut cursor, &mut rightmost)?;

    if cursor.next_leaf != leaves.len() || cursor.next_path != inner_paths.len() {
        return Err(TreeError::MalformedProof("leftover leaves".into()));
    }

    let left_index = if left_path.is_empty() {
        -1
    } else {
        let mut index: u64 = 0;
        let mut size: u64 = 1;
        for step in left_path {
            if step.side == Side::Left {
                index += step.size.saturating_sub(size);
            }
            size = step.size;
        }
        index as i64
    };

    Ok(Derived { root_digest, tree_end: rightmost, left_index })
}

/// Folds `seed` up through `path`, recursively consuming `cursor`'s next
/// leaf/inner-path whenever a fork is found (a `Side::Right` step while
/// leaves remain — spec §4.4's `COMPUTE_ROOT`). `rightmost` is cleared
/// the moment a `Side::Right` step is seen *after* the cursor has been
/// exhausted: that step can only be a plain fold past the last proven
/// leaf into genuinely unrevealed, non-rightmost content.
fn fold(
    hasher: &dyn Hasher,
    mut h: Digest,
    path: &[ProofInner],
    cursor: &mut Cursor<'_>,
    rightmost: &mut bool,
) -> Result<Digest, TreeError> {
    for step in path {
        match step.side {
            Side::Left => {
                h = hasher.inner_digest(step.height, step.size, &step.sibling_digest, &h, step.version);
            }
            Side::Right if !cursor.exhausted() => {
                let (next_seed, next_path) = cursor.take(hasher)?;
                let right = fold(hasher, next_seed, next_path, cursor, rightmost)?;
                h = hasher.inner_digest(step.height, step.size, &h, &right, step.version);
            }
            Side::Right => {
                *rightmost = false;
                h = hasher.inner_digest(step.height, step.size, &h, &step.sibling_digest, step.version);
            }
        }
    }
    Ok(h)
}

/// Descends from `root` toward `key`, recording the root-ward path
/// (returned leaf-adjacent first) and landing on the leaf at `key`, or
/// the predecessor leaf if absent. `None` if the tree is empty.
fn descend(root: &Arc<Node>, key: &[u8]) -> (Vec<ProofInner>, Option<Arc<Node>>) {
    let mut path = Vec::new();
    let mut current = root.clone();
    loop {
        match current.as_ref() {
            Node::Inner { key: nk, height, size, version, left, right, .. } => {
                if key < nk.as_slice() {
                    path.push(ProofInner {
                        height: *height,
                        size: *size,
                        version: *version,
                        side: Side::Right,
                        sibling_digest: right.digest().clone(),
                    });
                    current = left.clone();
                } else {
                    path.push(ProofInner {
                        height: *height,
                        size: *size,
                        version: *version,
                        side: Side::Left,
                        sibling_digest: left.digest().clone(),
                    });
                    current = right.clone();
                }
            }
            Node::Leaf { .. } => {
                path.reverse();
                return (path, Some(current));
            }
            Node::Empty { .. } => return (Vec::new(), None),
        }
    }
}

fn proof_leaf_of(hasher: &dyn Hasher, node: &Node) -> ProofLeaf {
    match node {
        Node::Leaf { key, value, version, .. } => {
            ProofLeaf { key: key.clone(), value_digest: hasher.digest(value), version: *version }
        }
        _ => unreachable!("proof_leaf_of requires a Leaf"),
    }
}

/// Builds a single-leaf proof for `key`: an exact-match proof if present,
/// otherwise a boundary (predecessor) proof usable with `verify_absence`.
/// `None` if the tree is empty.
pub fn build_single(hasher: &dyn Hasher, root: &Arc<Node>, key: &[u8]) -> Option<RangeProof> {
    let (path, landed) = descend(root, key);
    let leaf = proof_leaf_of(hasher, landed?.as_ref());
    Some(RangeProof::new(path, Vec::new(), vec![leaf]))
}

fn in_range(key: &[u8], start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
    if let Some(s) = start {
        if key < s {
            return false;
        }
    }
    if let Some(e) = end {
        if key >= e {
            return false;
        }
    }
    true
}

fn collect(node: &Arc<Node>, start: Option<&[u8]>, end: Option<&[u8]>, limit: Option<usize>, out: &mut Vec<Arc<Node>>) {
    if let Some(l) = limit {
        if out.len() >= l {
            return;
        }
    }
    match node.as_ref() {
        Node::Empty { .. } => {}
        Node::Leaf { key, .. } => {
            if in_range(key, start, end) {
                out.push(node.clone());
            }
        }
        Node::Inner { key: nk, left, right, .. } => {
            if start.is_none_or(|s| s < nk.as_slice()) {
                collect(left, start, end, limit, out);
            }
            if let Some(l) = limit {
                if out.len() >= l {
                    return;
                }
            }
            if end.is_none_or(|e| nk.as_slice() < e) {
                collect(right, start, end, limit, out);
            }
        }
    }
}

fn common_root_suffix_len(a: &[ProofInner], b: &[ProofInner]) -> usize {
    let mut n = 0;
    while n < a.len() && n < b.len() && a[a.len() - 1 - n] == b[b.len() - 1 - n] {
        n += 1;
    }
    n
}

/// Builds a range proof covering `[start, end)`, truncated to `limit`
/// leaves if given. `None` if the tree is empty or the range is empty.
pub fn build_range(
    hasher: &dyn Hasher,
    root: &Arc<Node>,
    start: Option<&[u8]>,
    end: Option<&[u8]>,
    limit: Option<usize>,
) -> Result<Option<RangeProof>, TreeError> {
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(TreeError::InvalidRange);
        }
    }
    if root.is_empty() {
        return Ok(None);
    }

    let mut nodes = Vec::new();
    collect(root, start, end, limit, &mut nodes);
    if nodes.is_empty() {
        return Ok(None);
    }

    let Some(first_key) = nodes[0].key() else {
        unreachable!("collect only ever pushes Leaf nodes")
    };
    let mut previous_full_path = descend(root, first_key).0;
    let mut inner_paths = Vec::with_capacity(nodes.len() - 1);
    for node in &nodes[1..] {
        let Some(key) = node.key() else {
            unreachable!("collect only ever pushes Leaf nodes")
        };
        let full_path = descend(root, key).0;
        let shared = common_root_suffix_len(&previous_full_path, &full_path);
        inner_paths.push(full_path[..full_path.len() - shared].to_vec());
        previous_full_path = full_path;
    }

    let leaves = nodes.iter().map(|n| proof_leaf_of(hasher, n.as_ref())).collect();
    let left_path = descend(root, first_key).0;
    Ok(Some(RangeProof::new(left_path, inner_paths, leaves)))
}
