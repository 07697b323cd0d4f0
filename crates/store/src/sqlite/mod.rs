//! A SQLite-backed [`crate::NodeStore`] (spec §6's persistent layout,
//! retargeted from Postgres to an embedded SQLite file), modeled on
//! `warg_server::datastore::postgres`: a connection, a `diesel::table!`
//! schema, `Insertable`/`Queryable` row structs, and migrations run on
//! open rather than expected to pre-exist.

mod models;
mod schema;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use avl_hash::{Digest, Hasher, Sha256Hasher};
use avl_tree::Node;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use self::models::{InnerRow, LeafRow, NodeRow, OrphanRow};
use self::schema::{inner, leaf, node, orphan};
use crate::error::StoreError;
use crate::node_store::NodeStore;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// A SQLite-backed [`NodeStore`].
///
/// Interior mutability is a plain [`RefCell`] around the connection, not
/// a `Mutex`: spec §5 mandates a single-writer, single-threaded owner
/// for the working tree, so `SqliteNodeStore` is intentionally `!Sync`.
/// An embedder that wants to share committed-version reads across
/// threads opens a second connection to the same file rather than
/// sharing this value.
///
/// Two materialization paths exist, chosen by what the caller actually
/// needs:
///
/// - Whole-subtree operations (`root_at`, and through it `commit`/
///   `rollback`/`iterate`/`iterate_range`/proof-building, all of which
///   must visit or serialize an entire subtree anyway) go through
///   `materialize`, which recursively builds real `avl_tree::Node`
///   values and memoizes them in `cache` keyed by digest — at-most-once
///   evaluation per digest for the lifetime of the store (spec §5, §9
///   "Lazy value boxes"), generalized to a per-store cache rather than a
///   box embedded in each node, since `avl_tree::Node`'s children are
///   plain `Arc<Node>` rather than a lazily-resolved cell.
/// - Single-key/single-index point operations (`get`/`has`/`next`/
///   `get_index` against a historical version) never call `materialize`
///   at all: they walk `node`/`leaf`/`inner` rows one level at a time
///   via `point_get`/`point_get_index`/`point_next`, touching only the
///   O(log n) rows on the path to the answer instead of pulling the
///   whole historical version into memory. Point lookups against the
///   *working* version skip the database entirely and read
///   `working_root` directly, since it is already resident.
pub struct SqliteNodeStore {
    hasher: Arc<dyn Hasher>,
    conn: RefCell<SqliteConnection>,
    cache: RefCell<HashMap<Digest, Arc<Node>>>,
    working_version: i64,
    working_root: Arc<Node>,
}

/// A node's shape as read directly off one `node`/`leaf`/`inner` row,
/// without recursing into children. The building block `point_get`/
/// `point_get_index`/`point_next` use to walk a single root-to-leaf path.
enum RowKind {
    Empty,
    Leaf { key: Vec<u8>, value: Vec<u8> },
    Inner { key: Vec<u8>, left: Digest, right: Digest, size: u64 },
}

impl RowKind {
    fn size(&self) -> u64 {
        match self {
            RowKind::Empty => 0,
            RowKind::Leaf { .. } => 1,
            RowKind::Inner { size, .. } => *size,
        }
    }
}

/// Loads the single row at `digest`, without touching its children.
fn load_row(hasher: &dyn Hasher, conn: &RefCell<SqliteConnection>, digest: &Digest) -> Result<RowKind, StoreError> {
    if digest == &hasher.empty_digest() {
        return Ok(RowKind::Empty);
    }

    let hex_hash = hex::encode(digest.as_bytes());
    let mut c = conn.borrow_mut();

    if let Some(row) = leaf::table.find(&hex_hash).first::<LeafRow>(&mut *c).optional()? {
        return Ok(RowKind::Leaf { key: row.key, value: row.value });
    }

    let row = inner::table
        .find(&hex_hash)
        .first::<InnerRow>(&mut *c)
        .optional()?
        .ok_or_else(|| StoreError::NodeMissing(digest.clone()))?;
    drop(c);

    let left =
        Digest::from_bytes(hex::decode(&row.left).map_err(|_| StoreError::NodeMissing(digest.clone()))?);
    let right =
        Digest::from_bytes(hex::decode(&row.right).map_err(|_| StoreError::NodeMissing(digest.clone()))?);
    Ok(RowKind::Inner { key: row.key, left, right, size: row.size as u64 })
}

/// Row-driven equivalent of `avl_tree::get`: descends one child per
/// level, fetching the sibling's size only when descending right.
fn point_get(
    hasher: &dyn Hasher,
    conn: &RefCell<SqliteConnection>,
    digest: &Digest,
    key: &[u8],
) -> Result<(u64, Option<Vec<u8>>), StoreError> {
    match load_row(hasher, conn, digest)? {
        RowKind::Empty => Ok((0, None)),
        RowKind::Leaf { key: lk, value } => Ok(match key.cmp(lk.as_slice()) {
            std::cmp::Ordering::Equal => (0, Some(value)),
            std::cmp::Ordering::Less => (0, None),
            std::cmp::Ordering::Greater => (1, None),
        }),
        RowKind::Inner { key: nk, left, right, .. } => {
            if key < nk.as_slice() {
                point_get(hasher, conn, &left, key)
            } else {
                let (idx, value) = point_get(hasher, conn, &right, key)?;
                let left_size = load_row(hasher, conn, &left)?.size();
                Ok((left_size + idx, value))
            }
        }
    }
}

/// Row-driven equivalent of `avl_tree::get_index`.
fn point_get_index(
    hasher: &dyn Hasher,
    conn: &RefCell<SqliteConnection>,
    digest: &Digest,
    index: u64,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
    match load_row(hasher, conn, digest)? {
        RowKind::Empty => Ok(None),
        RowKind::Leaf { key, value } => Ok(if index == 0 { Some((key, value)) } else { None }),
        RowKind::Inner { left, right, .. } => {
            let left_size = load_row(hasher, conn, &left)?.size();
            if index < left_size {
                point_get_index(hasher, conn, &left, index)
            } else {
                point_get_index(hasher, conn, &right, index - left_size)
            }
        }
    }
}

/// Row-driven equivalent of `avl_tree::next`.
fn point_next(
    hasher: &dyn Hasher,
    conn: &RefCell<SqliteConnection>,
    digest: &Digest,
    key: &[u8],
) -> Result<Option<Vec<u8>>, StoreError> {
    match load_row(hasher, conn, digest)? {
        RowKind::Empty => Ok(None),
        RowKind::Leaf { key: lk, .. } => Ok(if lk.as_slice() > key { Some(lk) } else { None }),
        RowKind::Inner { key: nk, left, right, .. } => {
            if key < nk.as_slice() {
                Ok(point_next(hasher, conn, &left, key)?.or(Some(nk)))
            } else {
                point_next(hasher, conn, &right, key)
            }
        }
    }
}

/// Resolves `version` to its root digest with a single row lookup,
/// without materializing the node it names.
fn root_digest_at(conn: &RefCell<SqliteConnection>, version: i64) -> Result<Option<Digest>, StoreError> {
    let hex_hash = node::table
        .select(node::hash)
        .filter(node::root_version.eq(version))
        .first::<String>(&mut *conn.borrow_mut())
        .optional()?;
    let Some(hex_hash) = hex_hash else { return Ok(None) };
    let bytes =
        hex::decode(&hex_hash).map_err(|_| StoreError::ConnectionFailed("corrupt root hash".into()))?;
    Ok(Some(Digest::from_bytes(bytes)))
}

/// Resolves `digest` to a fully materialized node, recursively loading
/// and caching children as needed. A free function (rather than a
/// method) so it can run during [`SqliteNodeStore::open_with_hasher`],
/// before a `Self` exists to call a method on. Used only where a whole
/// subtree is genuinely needed (see the type-level doc comment) — point
/// lookups use `point_get`/`point_get_index`/`point_next` instead.
fn materialize(
    hasher: &dyn Hasher,
    conn: &RefCell<SqliteConnection>,
    cache: &RefCell<HashMap<Digest, Arc<Node>>>,
    digest: &Digest,
) -> Result<Arc<Node>, StoreError> {
    if digest == &hasher.empty_digest() {
        return Ok(Node::empty(hasher));
    }
    if let Some(cached) = cache.borrow().get(digest) {
        return Ok(cached.clone());
    }

    let hex_hash = hex::encode(digest.as_bytes());
    let mut c = conn.borrow_mut();

    if let Some(row) = leaf::table.find(&hex_hash).first::<LeafRow>(&mut *c).optional()? {
        drop(c);
        let built = Node::leaf(hasher, row.key, row.value, row.version);
        cache.borrow_mut().insert(digest.clone(), built.clone());
        return Ok(built);
    }

    let row = inner::table
        .find(&hex_hash)
        .first::<InnerRow>(&mut *c)
        .optional()?
        .ok_or_else(|| StoreError::NodeMissing(digest.clone()))?;
    drop(c);

    let left_digest =
        Digest::from_bytes(hex::decode(&row.left).map_err(|_| StoreError::NodeMissing(digest.clone()))?);
    let right_digest =
        Digest::from_bytes(hex::decode(&row.right).map_err(|_| StoreError::NodeMissing(digest.clone()))?);
    let left = materialize(hasher, conn, cache, &left_digest)?;
    let right = materialize(hasher, conn, cache, &right_digest)?;
    let built = Node::inner(hasher, row.key, left, right, row.version);
    cache.borrow_mut().insert(digest.clone(), built.clone());
    Ok(built)
}

impl SqliteNodeStore {
    /// Opens (creating if necessary) a SQLite-backed store at `path`,
    /// running pending migrations and seeding the version-0 empty root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_hasher(path, Arc::new(Sha256Hasher))
    }

    /// Like [`Self::open`], with a specific [`Hasher`].
    pub fn open_with_hasher(path: impl AsRef<Path>, hasher: Arc<dyn Hasher>) -> Result<Self, StoreError> {
        let mut conn = SqliteConnection::establish(&path.as_ref().to_string_lossy())
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let empty_digest = hasher.empty_digest();
        diesel::insert_or_ignore_into(node::table)
            .values(NodeRow { hash: hex::encode(empty_digest.as_bytes()), root_version: Some(0) })
            .execute(&mut conn)?;

        let working_version = node::table
            .select(diesel::dsl::max(node::root_version))
            .first::<Option<i64>>(&mut conn)?
            .map(|v| v + 1)
            .unwrap_or(1);

        let conn = RefCell::new(conn);
        let cache = RefCell::new(HashMap::new());
        let root_hex = node::table
            .select(node::hash)
            .filter(node::root_version.eq(working_version - 1))
            .first::<String>(&mut *conn.borrow_mut())?;
        let root_digest =
            Digest::from_bytes(hex::decode(&root_hex).map_err(|_| StoreError::ConnectionFailed("corrupt root hash".into()))?);
        let working_root = materialize(hasher.as_ref(), &conn, &cache, &root_digest)?;

        Ok(SqliteNodeStore { hasher, conn, cache, working_version, working_root })
    }

    fn materialize(&self, digest: &Digest) -> Result<Arc<Node>, StoreError> {
        materialize(self.hasher.as_ref(), &self.conn, &self.cache, digest)
    }

    /// Persists every node of `root`'s subtree that isn't already in the
    /// `node` table, recursively. Content-addressing makes this
    /// idempotent: a node shared with an earlier committed version is
    /// already present and `INSERT OR IGNORE` skips it.
    fn persist(&self, node: &Node) -> Result<(), StoreError> {
        let hex = hex::encode(node.digest().as_bytes());
        let mut conn = self.conn.borrow_mut();
        let already_present = diesel::select(diesel::dsl::exists(node::table.find(&hex))).get_result(&mut *conn)?;
        if already_present {
            return Ok(());
        }

        diesel::insert_or_ignore_into(node::table)
            .values(NodeRow { hash: hex.clone(), root_version: None })
            .execute(&mut *conn)?;

        match node {
            Node::Empty { .. } => {}
            Node::Leaf { key, value, version, .. } => {
                diesel::insert_or_ignore_into(leaf::table)
                    .values(LeafRow { hash: hex, key: key.clone(), value: value.clone(), version: *version })
                    .execute(&mut *conn)?;
            }
            Node::Inner { key, left, right, version, .. } => {
                let left_hex = hex::encode(left.digest().as_bytes());
                let right_hex = hex::encode(right.digest().as_bytes());
                diesel::insert_or_ignore_into(inner::table)
                    .values(InnerRow {
                        hash: hex,
                        key: key.clone(),
                        height: node.height() as i32,
                        size: node.size() as i64,
                        left: left_hex,
                        right: right_hex,
                        version: *version,
                    })
                    .execute(&mut *conn)?;
                drop(conn);
                self.persist(left)?;
                self.persist(right)?;
                return Ok(());
            }
        }
        Ok(())
    }

    fn record_orphans(&self, displaced: &[Arc<Node>]) -> Result<(), StoreError> {
        let mut conn = self.conn.borrow_mut();
        for n in displaced {
            if let Some(birth_version) = n.version() {
                if birth_version < self.working_version {
                    diesel::insert_or_ignore_into(orphan::table)
                        .values(OrphanRow { hash: hex::encode(n.digest().as_bytes()), until: self.working_version })
                        .execute(&mut *conn)?;
                }
            }
        }
        Ok(())
    }
}

impl NodeStore for SqliteNodeStore {
    fn hasher(&self) -> &dyn Hasher {
        self.hasher.as_ref()
    }

    fn root_at(&self, version: i64) -> Result<Option<Arc<Node>>, StoreError> {
        let Some(digest) = root_digest_at(&self.conn, version)? else {
            return Ok(None);
        };
        Ok(Some(self.materialize(&digest)?))
    }

    fn versions(&self) -> Result<BTreeSet<i64>, StoreError> {
        Ok(node::table
            .select(node::root_version)
            .filter(node::root_version.is_not_null())
            .load::<Option<i64>>(&mut *self.conn.borrow_mut())?
            .into_iter()
            .flatten()
            .collect())
    }

    fn version(&self) -> i64 {
        self.working_version
    }

    fn working_root(&self) -> Arc<Node> {
        self.working_root.clone()
    }

    fn get(&self, key: &[u8], version: Option<i64>) -> Result<(u64, Option<Vec<u8>>), StoreError> {
        match version {
            None => Ok(avl_tree::get(&self.working_root, key)),
            Some(v) => {
                let digest = root_digest_at(&self.conn, v)?.ok_or(StoreError::VersionMissing(v))?;
                point_get(self.hasher.as_ref(), &self.conn, &digest, key)
            }
        }
    }

    fn get_index(&self, index: u64, version: Option<i64>) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        match version {
            None => Ok(avl_tree::get_index(&self.working_root, index)),
            Some(v) => {
                let digest = root_digest_at(&self.conn, v)?.ok_or(StoreError::VersionMissing(v))?;
                point_get_index(self.hasher.as_ref(), &self.conn, &digest, index)
            }
        }
    }

    fn has(&self, key: &[u8], version: Option<i64>) -> Result<bool, StoreError> {
        Ok(self.get(key, version)?.1.is_some())
    }

    fn next(&self, key: &[u8], version: Option<i64>) -> Result<Option<Vec<u8>>, StoreError> {
        match version {
            None => Ok(avl_tree::next(&self.working_root, key)),
            Some(v) => {
                let digest = root_digest_at(&self.conn, v)?.ok_or(StoreError::VersionMissing(v))?;
                point_next(self.hasher.as_ref(), &self.conn, &digest, key)
            }
        }
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
        self.record_orphans(&displaced)?;
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
        self.record_orphans(&displaced)?;
        self.working_root = new_root.unwrap_or_else(|| Node::empty(self.hasher.as_ref()));
        Ok((removed_value, removed))
    }

    fn commit(&mut self) -> Result<(Digest, i64), StoreError> {
        let version = self.working_version;
        tracing::debug!(version, "commit");
        self.persist(&self.working_root)?;
        let hex_hash = hex::encode(self.working_root.digest().as_bytes());
        self.conn.borrow_mut().transaction(|conn| {
            diesel::update(node::table.find(&hex_hash))
                .set(node::root_version.eq(Some(version)))
                .execute(conn)
        })?;
        let digest = self.working_root.digest().clone();
        self.working_version += 1;
        Ok((digest, version))
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        tracing::debug!(version = self.working_version, "rollback");
        let last = self.working_version - 1;
        self.working_root = self.root_at(last)?.unwrap_or_else(|| Node::empty(self.hasher.as_ref()));
        diesel::delete(orphan::table.filter(orphan::until.eq(self.working_version)))
            .execute(&mut *self.conn.borrow_mut())?;
        Ok(())
    }

    fn delete_last(&mut self) -> Result<(), StoreError> {
        let last = self.working_version - 1;
        tracing::debug!(version = last, "delete_last");
        if last <= 0 {
            return Err(StoreError::CannotDeleteGenesis);
        }
        let mut conn = self.conn.borrow_mut();
        conn.transaction(|conn| {
            diesel::update(node::table.filter(node::root_version.eq(last)))
                .set(node::root_version.eq::<Option<i64>>(None))
                .execute(conn)?;
            diesel::delete(orphan::table.filter(orphan::until.eq(last))).execute(conn)
        })?;
        drop(conn);
        self.working_version = last;
        self.working_root = self.root_at(last - 1)?.unwrap_or_else(|| Node::empty(self.hasher.as_ref()));
        Ok(())
    }

    fn delete_all(&mut self, from: i64) -> Result<(), StoreError> {
        tracing::debug!(from, "delete_all");
        let mut conn = self.conn.borrow_mut();
        conn.transaction(|conn| {
            diesel::update(node::table.filter(node::root_version.ge(from)))
                .set(node::root_version.eq::<Option<i64>>(None))
                .execute(conn)?;
            diesel::delete(orphan::table.filter(orphan::until.ge(from))).execute(conn)
        })?;
        drop(conn);
        self.working_version = from;
        self.working_root = self.root_at(from - 1)?.unwrap_or_else(|| Node::empty(self.hasher.as_ref()));
        Ok(())
    }

    fn orphans_in(&self, lo: i64, hi: i64) -> Result<Vec<Digest>, StoreError> {
        let mut conn = self.conn.borrow_mut();
        let candidates = orphan::table
            .select((orphan::hash, orphan::until))
            .filter(orphan::until.le(hi))
            .load::<(String, i64)>(&mut *conn)?;

        let mut out = Vec::new();
        for (hash, _until) in candidates {
            let birth_version = leaf::table
                .select(leaf::version)
                .filter(leaf::hash.eq(&hash))
                .first::<i64>(&mut *conn)
                .optional()?;
            let birth_version = match birth_version {
                Some(v) => Some(v),
                None => inner::table.select(inner::version).filter(inner::hash.eq(&hash)).first::<i64>(&mut *conn).optional()?,
            };
            if let Some(birth_version) = birth_version {
                if birth_version >= lo {
                    let bytes = hex::decode(&hash)
                        .map_err(|_| StoreError::ConnectionFailed("corrupt orphan hash".into()))?;
                    out.push(Digest::from_bytes(bytes));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(n: u8) -> Vec<u8> {
        vec![n]
    }

    fn open_temp() -> (tempfile::TempDir, SqliteNodeStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");
        let store = SqliteNodeStore::open(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_seeds_version_zero() {
        let (_dir, store) = open_temp();
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0]));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_commit_persists_and_reopen_recovers_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");
        {
            let mut store = SqliteNodeStore::open(&path).unwrap();
            for i in 0..10u8 {
                store.set(&k(i), &k(i)).unwrap();
            }
            store.commit().unwrap();
        }
        let reopened = SqliteNodeStore::open(&path).unwrap();
        assert_eq!(reopened.versions().unwrap(), BTreeSet::from([0, 1]));
        let (idx, value) = reopened.get(&k(6), Some(1)).unwrap();
        assert_eq!(idx, 6);
        assert_eq!(value, Some(k(6)));
    }

    #[test]
    fn test_point_lookups_against_historical_version() {
        let (_dir, mut store) = open_temp();
        for i in 0..5u8 {
            store.set(&k(i), &k(i)).unwrap();
        }
        store.commit().unwrap(); // version 1
        store.remove(&k(2)).unwrap();
        store.commit().unwrap(); // version 2

        // Version 1 still has key 2; version 2 (current) does not.
        assert_eq!(store.get(&k(2), Some(1)).unwrap().1, Some(k(2)));
        assert_eq!(store.get(&k(2), Some(2)).unwrap().1, None);
        assert!(store.has(&k(2), Some(1)).unwrap());
        assert!(!store.has(&k(2), Some(2)).unwrap());
        assert_eq!(store.next(&k(2), Some(1)).unwrap(), Some(k(3)));
        assert_eq!(store.get_index(2, Some(1)).unwrap(), Some((k(2), k(2))));

        // An unknown version surfaces VersionMissing rather than panicking.
        assert!(matches!(store.get(&k(0), Some(99)), Err(StoreError::VersionMissing(99))));
    }

    #[test]
    fn test_orphans_persist_across_commit() {
        let (_dir, mut store) = open_temp();
        store.set(&k(1), &k(1)).unwrap();
        store.commit().unwrap();
        store.set(&k(1), &k(9)).unwrap();
        store.commit().unwrap();
        assert_eq!(store.orphans_in(0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_last_rejects_deleting_genesis() {
        let (_dir, mut store) = open_temp();
        assert!(matches!(store.delete_last(), Err(StoreError::CannotDeleteGenesis)));
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0]));

        store.set(&k(1), &k(1)).unwrap();
        store.commit().unwrap();
        store.delete_last().unwrap();
        assert!(matches!(store.delete_last(), Err(StoreError::CannotDeleteGenesis)));
        assert_eq!(store.versions().unwrap(), BTreeSet::from([0]));
    }
}
