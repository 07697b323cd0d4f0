#[cfg(feature = "sqlite")]
use std::path::PathBuf;

pub use avl_hash::HashAlgorithm;

use crate::error::StoreError;
use crate::memory::MemoryNodeStore;
use crate::node_store::NodeStore;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteNodeStore;

/// Selects a [`crate::NodeStore`] backend and hash algorithm (spec §6).
///
/// Constructed programmatically by the embedding application — this
/// library has no CLI or environment-variable parsing (Non-goal: CLI),
/// mirroring the shape of the teacher's `DataStoreKind`/`Args` pair but
/// without the `clap` derive, since there is no binary here to parse
/// arguments for.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum StoreConfig {
    /// An in-memory store (spec §4.5's default backing).
    Memory,
    /// A SQLite-backed store at the given file path (spec §6's
    /// persistent layout, retargeted from Postgres to SQLite).
    #[cfg(feature = "sqlite")]
    Sqlite(PathBuf),
}

impl StoreConfig {
    /// The hash algorithm this configuration uses. Currently always
    /// [`HashAlgorithm::Sha256`]: the only algorithm `avl-hash` ships.
    /// Kept as a method (rather than inlining `HashAlgorithm::Sha256`
    /// everywhere) so a future second algorithm only has to change one
    /// place.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    /// Opens the backend this configuration selects, mirroring the
    /// teacher's `main.rs` match on `DataStoreKind` that builds a
    /// `Box<dyn DataStore>`. The embedding application calls this once at
    /// startup; everything after that drives the store through the
    /// `NodeStore` trait object, oblivious to which backend it got.
    pub fn open(&self) -> Result<Box<dyn NodeStore>, StoreError> {
        match self {
            StoreConfig::Memory => Ok(Box::new(MemoryNodeStore::new())),
            #[cfg(feature = "sqlite")]
            StoreConfig::Sqlite(path) => Ok(Box::new(SqliteNodeStore::open(path)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_config_opens() {
        let store = StoreConfig::Memory.open().unwrap();
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn opened_store_drives_tree_facade() {
        let store = StoreConfig::Memory.open().unwrap();
        let mut tree = crate::Tree::new(store);
        tree.set(b"k", b"v").unwrap();
        assert_eq!(tree.get(b"k").unwrap().1, Some(b"v".to_vec()));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_config_opens() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreConfig::Sqlite(dir.path().join("store.sqlite")).open().unwrap();
        assert_eq!(store.version(), 1);
    }
}
