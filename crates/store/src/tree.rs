use avl_hash::Digest;
use avl_tree::RangeProof;

use crate::error::StoreError;
use crate::node_store::NodeStore;

/// The user-facing handle over a [`NodeStore`] (spec §4.6, C6): every
/// method is a direct translation into store operations, adding no
/// state of its own beyond the store it wraps.
pub struct Tree<S> {
    store: S,
}

impl<S: NodeStore> Tree<S> {
    /// Wraps an existing store.
    pub fn new(store: S) -> Self {
        Tree { store }
    }

    /// Unwraps back into the underlying store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Direct access to the underlying store, for callers that need an
    /// operation this facade doesn't expose (pruning via
    /// [`NodeStore::orphans_in`], for instance).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts or updates `key`/`value` in the working tree.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        self.store.set(key, value)
    }

    /// Removes `key` from the working tree if present.
    pub fn remove(&mut self, key: &[u8]) -> Result<(Option<Vec<u8>>, bool), StoreError> {
        self.store.remove(key)
    }

    /// `get(key)` against the working tree.
    pub fn get(&self, key: &[u8]) -> Result<(u64, Option<Vec<u8>>), StoreError> {
        self.store.get(key, None)
    }

    /// Whether `key` is present in the working tree.
    pub fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.store.has(key, None)
    }

    /// In-order (or reverse) traversal of the working tree.
    pub fn iterate(&self, ascending: bool, f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<(), StoreError> {
        self.store.iterate(ascending, None, f)
    }

    /// Traversal of the working tree restricted to `[start, end)` (or
    /// `[start, end]` when `inclusive`).
    pub fn iterate_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        inclusive: bool,
        ascending: bool,
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), StoreError> {
        self.store.iterate_range(start, end, inclusive, ascending, None, f)
    }

    /// The working tree's root digest.
    pub fn working_hash(&self) -> Digest {
        self.store.working_root().digest().clone()
    }

    /// The most recently committed root's digest (equal to
    /// `working_hash` immediately after a `commit`, and whenever the
    /// working tree carries no uncommitted mutations).
    pub fn hash(&self) -> Result<Digest, StoreError> {
        let last = self.store.version() - 1;
        Ok(self
            .store
            .root_at(last)?
            .ok_or(StoreError::VersionMissing(last))?
            .digest()
            .clone())
    }

    /// Commits the working tree, returning its digest and version.
    pub fn commit(&mut self) -> Result<(Digest, i64), StoreError> {
        self.store.commit()
    }

    /// Discards uncommitted mutations.
    pub fn rollback(&mut self) -> Result<(), StoreError> {
        self.store.rollback()
    }

    /// `get(key)` against a specific committed `version`.
    pub fn get_versioned(&self, key: &[u8], version: i64) -> Result<(u64, Option<Vec<u8>>), StoreError> {
        self.store.get(key, Some(version))
    }

    /// A single-key existence/absence proof for `key` under `version`.
    pub fn get_versioned_with_proof(
        &self,
        key: &[u8],
        version: i64,
    ) -> Result<(Option<Vec<u8>>, Option<RangeProof>), StoreError> {
        let root = self.store.root_at(version)?.ok_or(StoreError::VersionMissing(version))?;
        let (_, value) = avl_tree::get(&root, key);
        let proof = avl_tree::build_single(self.store.hasher(), &root, key);
        Ok((value, proof))
    }

    /// A range proof covering `[start, end)` (truncated to `limit`
    /// leaves if given) under `version`.
    pub fn get_versioned_range_with_proof(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        limit: Option<usize>,
        version: i64,
    ) -> Result<Option<RangeProof>, StoreError> {
        let root = self.store.root_at(version)?.ok_or(StoreError::VersionMissing(version))?;
        avl_tree::build_range(self.store.hasher(), &root, start, end, limit).map_err(StoreError::from)
    }

    /// Removes the committed version `version` (must be the newest)
    /// from the store.
    pub fn delete_version(&mut self, version: i64) -> Result<(), StoreError> {
        let last = self.store.version() - 1;
        if version != last {
            return Err(StoreError::NotLatestVersion(version));
        }
        self.store.delete_last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNodeStore;

    fn k(n: u8) -> Vec<u8> {
        vec![n]
    }

    #[test]
    fn test_facade_commit_and_versioned_get() {
        let mut tree = Tree::new(MemoryNodeStore::new());
        for i in 0..10u8 {
            tree.set(&k(i), &k(i)).unwrap();
        }
        let (digest, version) = tree.commit().unwrap();
        assert_eq!(version, 1);
        assert_eq!(tree.hash().unwrap(), digest);

        let (idx, value) = tree.get_versioned(&k(4), 1).unwrap();
        assert_eq!(idx, 4);
        assert_eq!(value, Some(k(4)));
    }

    #[test]
    fn test_facade_proof_round_trips_through_verify() {
        let mut tree = Tree::new(MemoryNodeStore::new());
        for i in 0..10u8 {
            tree.set(&k(i), &k(i)).unwrap();
        }
        let (root, version) = tree.commit().unwrap();
        let (value, proof) = tree.get_versioned_with_proof(&k(4), version).unwrap();
        let proof = proof.unwrap();
        assert_eq!(value, Some(k(4)));
        proof.verify_item(tree.store().hasher(), &root, &k(4), &k(4)).unwrap();
    }

    #[test]
    fn test_delete_version_requires_newest() {
        let mut tree = Tree::new(MemoryNodeStore::new());
        tree.set(&k(1), &k(1)).unwrap();
        tree.commit().unwrap();
        tree.set(&k(2), &k(2)).unwrap();
        tree.commit().unwrap();
        assert!(matches!(tree.delete_version(1), Err(StoreError::NotLatestVersion(1))));
        tree.delete_version(2).unwrap();
    }
}
