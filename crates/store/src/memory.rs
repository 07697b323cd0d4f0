use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use avl_hash::{Digest, Hasher, Sha256Hasher};
use avl_tree::Node;

use crate::error::StoreError;
use crate::node_store::NodeStore;

/// An orphaned node's digest together with the version it was born in,
/// so [`NodeStore::orphans_in`] can answer the birth-and-death range
/// query spec §4.5 requires without a second lookup table.
#[derive(Debug, Clone)]
struct Orphan {
    digest: Digest,
    birth_version: i64,
}

/// An in-memory [`NodeStore`] (spec §4.5, §9).
///
/// Data is not persisted between process restarts; this is mainly meant
/// for tests and for embedding applications that rebuild state from their
/// own event log on startup, mirroring the teacher's
/// `MemoryDataStore` ("mainly used for testing"). Unlike the teacher's
/// store, no lock is held here: spec §5 mandates a single-writer,
/// single-threaded owner for the working tree, so interior mutability
/// via a shared `Mutex` would only hide a concurrent-access bug the spec
/// rules out by construction. An embedder that wants to share a
/// `MemoryNodeStore` across threads wraps it itself.
pub struct MemoryNodeStore {
    hasher: Arc<dyn Hasher>,
    roots: BTreeMap<i64, Arc<Node>>,
    orphans: BTreeMap<i64, Vec<Orphan>>,
    working_version: i64,
    working_root: Arc<Node>,
}

impl MemoryNodeStore {
    /// An empty store using the default SHA-256 hasher.
    pub fn new() -> Self {
        Self::with_hasher(Arc::new(Sha256Hasher))
    }

    /// An empty store using the given [`Hasher`]. Version 0 is committed
    /// immediately with the empty root, matching spec §8 scenario 6
    /// ("version 0 is the initial empty root").
    pub fn with_hasher(hasher: Arc<dyn Hasher>) -> Self {
        let empty = Node::empty(hasher.as_ref());
        let mut roots = BTreeMap::new();
        roots.insert(0, empty.clone());
        Self {
            hasher,
            roots,
            orphans: BTreeMap::new(),
            working_version: 1,
            working_root: empty,
        }
    }

    fn record_orphans(&mut self, displaced: Vec<Arc<Node>>) {
        for node in displaced {
            // A node born in an earlier committed version that this
            // mutation displaced is a real orphan of the working version.
            // A node born in the working version itself is a transient
            // intermediate of the same in-progress mutation cycle: it
            // was never reachable from a committed root, so it needs no
            // orphan record (spec §4.5).
            if let Some(birth_version) = node.version() {
                if birth_version < self.working_version {
                    self.orphans.entry(self.working_version).or_default().push(Orphan {
                        digest: node.digest().clone(),
                        birth_version,
                    });
                }
            }
        }
    }

    fn last_committed_version(&self) -> i64 {
        self.working_version - 1
    }
}

impl Default for MemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for MemoryNodeStore {
    fn hasher(&self) -> &dyn Hasher {
        self.hasher.as_ref()
    }

    fn root_at(&self, version: i64) -> Result<Option<Arc<Node>>, StoreError> {
        Ok(self.roots.get(&version).cloned())
    }

    fn versions(&self) -> Result<BTreeSet<i64>, StoreError> {
        Ok(self.roots.keys().copied().collect())
    }

    fn version(&self) -> i64 {
        self.working_version
    }

    fn working_root(&self) -> Arc<Node> {
        self.working_root.clone()
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        tracing::debug!(key = %hex::encode(key), version = self.working_version, "set");
        let mut displaced = Vec::new();
        let (new_root, updated) = avl_tree::recursive_set(
            self.hasher.as_ref(),
            &self.working_root,
            key,
            value,
            self.working_version,
            &mut displaced,
        );
        self.record_orphans(displaced);
        self.working_root = new_root;
        Ok(updated)
    }

    fn remove(&mut self, key: &[u8]) -> Result<(Option<Vec<u8>>, bool), StoreError> {
        tracing::debug!(key = %hex::encode(key), version = self.working_version, "remove");
        let mut displaced = Vec::new();
        let (new_root, _replacement_key, removed_value) = avl_tree::recursive_remove(
            self.hasher.as_ref(),
            &self.working_root,
            key,
            self.working_version,
            &mut displaced,
        );
        let removed = removed_value.is_some();
        self.record_orphans(displaced);
        self.working_root = new_root.unwrap_or_else(|| Node::empty(self.hasher.as_ref()));
        Ok((removed_value, removed))
    }

    fn commit(&mut self) -> Result<(Digest, i64), StoreError> {
        let version = self.working_version;
        tracing::debug!(version, "commit");
        self.roots.insert(version, self.working_root.clone());
        let digest = self.working_root.digest().clone();
        self.working_version += 1;
        Ok((digest, version))
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        tracing::debug!(version = self.working_version, "rollback");
        let last = self.last_committed_version();
        self.working_root = self
            .roots
            .get(&last)
            .cloned()
            .unwrap_or_else(|| Node::empty(self.hasher.as_ref()));
        // Mutations since the last commit only ever wrote orphan records
        // under `self.working_version` (the version that hasn't been
        // committed yet), so dropping that entry undoes their
        // bookkeeping along with the working tree itself.
        self.orphans.remove(&self.working_version);
        Ok(())
    }

    fn delete_last(&mut self) -> Result<(), StoreError> {
        let last = self.last_committed_version();
        tracing::debug!(version = last, "delete_last");
        if last <= 0 {
            return Err(StoreError::CannotDeleteGenesis);
        }
        if !self.roots.contains_key(&last) {
            return Err(StoreError::VersionMissing(last));
        }
        self.roots.remove(&last);
        self.orphans.remove(&last);
        self.working_version = last;
        self.working_root = self
            .roots
            .get(&(last - 1))
            .cloned()
            .unwrap_or_else(|| Node::empty(self.hasher.as_ref()));
        Ok(())
    }

    fn delete_all(&mut self, from: i64) -> Result<(), StoreError> {
        tracing::debug!(from, "delete_all");
        self.roots.retain(|&v, _| v < from);
        // Open Question resolution (SPEC_FULL §3): an orphan record only
        // matters for a version range that still exists. Once every
        // version `>= from` is gone, an orphan whose death version falls
        // in that range can never be queried by `orphans_in` against a
        // still-live range again, so it is cleared rather than left to
        // accumulate unboundedly.
        self.orphans.retain(|&v, _| v < from);
        self.working_version = from;
        self.working_root = self
            .roots
            .get(&(from - 1))
            .cloned()
            .unwrap_or_else(|| Node::empty(self.hasher.as_ref()));
        Ok(())
    }

    fn orphans_in(&self, lo: i64, hi: i64) -> Result<Vec<Digest>, StoreError> {
        Ok(self
            .orphans
            .range(lo..=hi)
            .flat_map(|(_, orphans)| orphans.iter())
            .filter(|o| o.birth_version >= lo)
            .map(|o| o.digest.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(n: u8) -> Vec<u8> {
        vec![n]
    }

    #[test]
    fn test_initial_store_has_version_zero() {
        let store = MemoryNodeStore::new();
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0]));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_node_factories_stamp_current_working_version() {
        let store = MemoryNodeStore::new();
        let leaf = store.leaf_node(k(1), k(1));
        assert_eq!(leaf.version(), Some(store.version()));
        let inner = store.inner_node(k(1), leaf.clone(), store.empty_node());
        assert_eq!(inner.version(), Some(store.version()));
        assert_eq!(inner.digest(), Node::inner(store.hasher(), k(1), leaf, store.empty_node(), store.version()).digest());
    }

    #[test]
    fn test_commit_advances_version_and_keeps_working_root() {
        let mut store = MemoryNodeStore::new();
        store.set(&k(1), &k(1)).unwrap();
        let (digest, version) = store.commit().unwrap();
        assert_eq!(version, 1);
        assert_eq!(store.version(), 2);
        assert_eq!(store.root_at(1).unwrap().unwrap().digest(), &digest);
        assert!(Arc::ptr_eq(&store.working_root(), &store.root_at(1).unwrap().unwrap()));
    }

    #[test]
    fn test_rollback_restores_prior_working_hash() {
        let mut store = MemoryNodeStore::new();
        store.set(&k(1), &k(1)).unwrap();
        store.commit().unwrap();
        let hash_before = store.working_root().digest().clone();
        store.set(&k(2), &k(2)).unwrap();
        store.remove(&k(1)).unwrap();
        store.rollback().unwrap();
        assert_eq!(store.working_root().digest(), &hash_before);
    }

    #[test]
    fn test_delete_last_removes_newest_version() {
        let mut store = MemoryNodeStore::new();
        store.set(&k(1), &k(1)).unwrap();
        store.commit().unwrap();
        store.set(&k(2), &k(2)).unwrap();
        store.commit().unwrap();
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0, 1, 2]));

        store.delete_last().unwrap();
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0, 1]));
        assert_eq!(store.working_root().digest(), store.root_at(1).unwrap().unwrap().digest());
    }

    #[test]
    fn test_delete_last_rejects_deleting_genesis() {
        let mut store = MemoryNodeStore::new();
        assert!(matches!(store.delete_last(), Err(StoreError::CannotDeleteGenesis)));
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0]));

        store.set(&k(1), &k(1)).unwrap();
        store.commit().unwrap();
        store.delete_last().unwrap();
        assert!(matches!(store.delete_last(), Err(StoreError::CannotDeleteGenesis)));
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0]));
    }

    #[test]
    fn test_delete_all_resets_working_version() {
        let mut store = MemoryNodeStore::new();
        for i in 0..3u8 {
            store.set(&k(i), &k(i)).unwrap();
            store.commit().unwrap();
        }
        store.delete_all(2).unwrap();
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0, 1]));
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_orphans_recorded_across_commit_boundary() {
        let mut store = MemoryNodeStore::new();
        store.set(&k(1), &k(1)).unwrap();
        store.commit().unwrap();
        store.set(&k(1), &k(2)).unwrap(); // overwrite displaces the v1 leaf
        store.commit().unwrap();
        let orphans = store.orphans_in(0, 10).unwrap();
        assert_eq!(orphans.len(), 1);
    }

    #[test]
    fn test_same_cycle_orphans_are_not_recorded() {
        let mut store = MemoryNodeStore::new();
        // Several sets before any commit only ever displace nodes born
        // in the same (uncommitted) working version.
        for i in 0..8u8 {
            store.set(&k(i), &k(i)).unwrap();
        }
        assert!(store.orphans_in(0, 10).unwrap().is_empty());
    }
}
