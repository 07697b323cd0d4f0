use std::collections::BTreeSet;
use std::sync::Arc;

use avl_hash::{Digest, Hasher};
use avl_tree::Node;

use crate::error::StoreError;

/// The versioned node store contract (spec §4.5): everything a backing
/// implementation — in-memory or SQLite-backed — must provide so that
/// [`crate::Tree`] (C6) can be driven generically over either.
///
/// Read operations default to the store's current working version when
/// `version` is `None`, and are themselves defaulted here in terms of
/// [`NodeStore::root_at`] plus the pure algorithms in `avl-tree`, per
/// spec §4.5 ("defaulted in terms of `root_at(version).<op>`"). A
/// backing store only has to get `root_at` right (including, for a
/// lazily-materializing store, loading child nodes on demand) to get
/// every read operation for free.
pub trait NodeStore {
    /// The hasher this store was constructed with.
    fn hasher(&self) -> &dyn Hasher;

    /// The root bound to `version`, or `None` if no such version was ever
    /// committed. `version` 0 is the initial empty root every store is
    /// constructed with.
    fn root_at(&self, version: i64) -> Result<Option<Arc<Node>>, StoreError>;

    /// The committed version set.
    fn versions(&self) -> Result<BTreeSet<i64>, StoreError>;

    /// The current working version: the version number the next
    /// `commit` will assign.
    fn version(&self) -> i64;

    /// The uncommitted working tree's root.
    fn working_root(&self) -> Arc<Node>;

    /// Inserts or updates `key`/`value` in the working tree. Returns
    /// `true` iff `key` already existed (its value was overwritten)
    /// rather than being newly inserted.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool, StoreError>;

    /// Removes `key` from the working tree if present. Returns the
    /// removed value and whether anything was actually removed.
    fn remove(&mut self, key: &[u8]) -> Result<(Option<Vec<u8>>, bool), StoreError>;

    /// Finalizes the working tree under the current working version,
    /// advances the working version by one, and leaves the working root
    /// unchanged (so subsequent mutations continue from the committed
    /// state). Returns the committed root's digest and version.
    fn commit(&mut self) -> Result<(Digest, i64), StoreError>;

    /// Discards every mutation since the last commit: the working root
    /// reverts to the last committed root.
    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Removes the newest committed version. The working tree is reset
    /// to the new latest committed root (spec §9 Open Question: this is
    /// the only reading under which `working_hash` after `delete_last`
    /// agrees with `root_at(version)`).
    fn delete_last(&mut self) -> Result<(), StoreError>;

    /// Removes every committed version `>= from`. The working version
    /// becomes `from`.
    fn delete_all(&mut self, from: i64) -> Result<(), StoreError>;

    /// Every orphan digest whose birth version is `>= lo` and whose
    /// death version is `<= hi` — the set of nodes a pruner may safely
    /// delete if it prunes exactly that version range (spec §4.5).
    fn orphans_in(&self, lo: i64, hi: i64) -> Result<Vec<Digest>, StoreError>;

    /// Constructs the empty node (spec §4.5's "Node factories" — exist
    /// so a backing store can hand out its own `Node` subtype instead of
    /// the shared `avl_tree::Node`; every store in this workspace uses
    /// the same `Node` type, so the default just delegates to
    /// [`Node::empty`]).
    fn empty_node(&self) -> Arc<Node> {
        Node::empty(self.hasher())
    }

    /// Constructs a leaf stamped with the current working version.
    fn leaf_node(&self, key: Vec<u8>, value: Vec<u8>) -> Arc<Node> {
        Node::leaf(self.hasher(), key, value, self.version())
    }

    /// Constructs an inner node over `left`/`right`, stamped with the
    /// current working version. `key` must be the minimum key of
    /// `right` (same precondition as [`Node::inner`]).
    fn inner_node(&self, key: Vec<u8>, left: Arc<Node>, right: Arc<Node>) -> Arc<Node> {
        Node::inner(self.hasher(), key, left, right, self.version())
    }

    /// `get(key)` against `version` (the working version if `None`):
    /// the in-order index `key` occupies or would occupy, and its value
    /// if present.
    fn get(&self, key: &[u8], version: Option<i64>) -> Result<(u64, Option<Vec<u8>>), StoreError> {
        let root = self.root_for(version)?;
        Ok(avl_tree::get(&root, key))
    }

    /// `get(index)` against `version`.
    fn get_index(&self, index: u64, version: Option<i64>) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let root = self.root_for(version)?;
        Ok(avl_tree::get_index(&root, index))
    }

    /// Whether `key` is present under `version`.
    fn has(&self, key: &[u8], version: Option<i64>) -> Result<bool, StoreError> {
        let root = self.root_for(version)?;
        Ok(avl_tree::has(&root, key))
    }

    /// The smallest key strictly greater than `key`, under `version`.
    fn next(&self, key: &[u8], version: Option<i64>) -> Result<Option<Vec<u8>>, StoreError> {
        let root = self.root_for(version)?;
        Ok(avl_tree::next(&root, key))
    }

    /// In-order (or reverse) traversal over `version`.
    fn iterate(
        &self,
        ascending: bool,
        version: Option<i64>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), StoreError> {
        let root = self.root_for(version)?;
        avl_tree::iterate(&root, ascending, f);
        Ok(())
    }

    /// Traversal restricted to `[start, end)` (or `[start, end]` when
    /// `inclusive`) over `version`.
    #[allow(clippy::too_many_arguments)]
    fn iterate_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        inclusive: bool,
        ascending: bool,
        version: Option<i64>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), StoreError> {
        let root = self.root_for(version)?;
        avl_tree::iterate_range(&root, start, end, inclusive, ascending, f);
        Ok(())
    }

    /// Resolves `version` to a root, defaulting to the working root and
    /// surfacing [`StoreError::VersionMissing`] for an unknown version.
    fn root_for(&self, version: Option<i64>) -> Result<Arc<Node>, StoreError> {
        match version {
            None => Ok(self.working_root()),
            Some(v) => self.root_at(v)?.ok_or(StoreError::VersionMissing(v)),
        }
    }
}

/// Lets a boxed trait object (as returned by [`crate::StoreConfig::open`])
/// stand in for a concrete backend wherever `S: NodeStore` is required,
/// e.g. as [`crate::Tree`]'s type parameter — forwarding every required
/// method to the wrapped store.
impl NodeStore for Box<dyn NodeStore> {
    fn hasher(&self) -> &dyn Hasher {
        (**self).hasher()
    }

    fn root_at(&self, version: i64) -> Result<Option<Arc<Node>>, StoreError> {
        (**self).root_at(version)
    }

    fn versions(&self) -> Result<BTreeSet<i64>, StoreError> {
        (**self).versions()
    }

    fn version(&self) -> i64 {
        (**self).version()
    }

    fn working_root(&self) -> Arc<Node> {
        (**self).working_root()
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &[u8]) -> Result<(Option<Vec<u8>>, bool), StoreError> {
        (**self).remove(key)
    }

    fn commit(&mut self) -> Result<(Digest, i64), StoreError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        (**self).rollback()
    }

    fn delete_last(&mut self) -> Result<(), StoreError> {
        (**self).delete_last()
    }

    fn delete_all(&mut self, from: i64) -> Result<(), StoreError> {
        (**self).delete_all(from)
    }

    fn orphans_in(&self, lo: i64, hi: i64) -> Result<Vec<Digest>, StoreError> {
        (**self).orphans_in(lo, hi)
    }

    // The read operations below have defaults in the trait itself, but
    // those defaults always go through `root_for`/`root_at`, which would
    // bypass `SqliteNodeStore`'s point-lookup overrides and silently
    // reintroduce the eager whole-subtree materialization the lazy
    // access path (SPEC_FULL §2) exists to avoid. Forward explicitly so
    // a boxed store keeps whatever read strategy the concrete backend
    // actually implements.

    fn get(&self, key: &[u8], version: Option<i64>) -> Result<(u64, Option<Vec<u8>>), StoreError> {
        (**self).get(key, version)
    }

    fn get_index(&self, index: u64, version: Option<i64>) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        (**self).get_index(index, version)
    }

    fn has(&self, key: &[u8], version: Option<i64>) -> Result<bool, StoreError> {
        (**self).has(key, version)
    }

    fn next(&self, key: &[u8], version: Option<i64>) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).next(key, version)
    }

    fn iterate(
        &self,
        ascending: bool,
        version: Option<i64>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), StoreError> {
        (**self).iterate(ascending, version, f)
    }

    fn iterate_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        inclusive: bool,
        ascending: bool,
        version: Option<i64>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), StoreError> {
        (**self).iterate_range(start, end, inclusive, ascending, version, f)
    }

    fn root_for(&self, version: Option<i64>) -> Result<Arc<Node>, StoreError> {
        (**self).root_for(version)
    }
}
