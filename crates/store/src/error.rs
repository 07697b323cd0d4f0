use avl_hash::Digest;
use avl_tree::TreeError;
use thiserror::Error;

/// Failures raised by a [`crate::NodeStore`] (spec §7), on top of the pure
/// [`TreeError`] the underlying tree algorithms and proof verifier raise.
#[derive(Error, Debug)]
pub enum StoreError {
    /// `root_at(version)` (or any operation defaulted in terms of it) was
    /// asked for a version that has never been committed.
    #[error("version `{0}` was not found")]
    VersionMissing(i64),

    /// A node referenced by digest could not be found in the backing
    /// store during materialization. This indicates on-disk corruption,
    /// not an untrusted-input error — surfaced rather than a hard panic
    /// so a caller driving a long-running service can decide how to
    /// react.
    #[error("node `{0}` referenced by the tree was not found in the backing store")]
    NodeMissing(Digest),

    /// [`crate::Tree::delete_version`] was asked to remove a version
    /// other than the newest committed one — `delete_last`'s own
    /// precondition (spec §4.5).
    #[error("version `{0}` is not the newest committed version")]
    NotLatestVersion(i64),

    /// `delete_last` was called with nothing but version 0 committed.
    /// Version 0 is the permanent initial empty root (spec §4.5, §8
    /// scenario 6) and is never deleted.
    #[error("version 0 is the permanent initial root and cannot be deleted")]
    CannotDeleteGenesis,

    /// A pure tree algorithm or proof verifier rejected the operation.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The backing store's I/O failed (disk read/write, SQL connection).
    #[cfg(feature = "sqlite")]
    #[error("backing store I/O failed: {0}")]
    IoFailure(#[from] diesel::result::Error),

    /// Opening or migrating the SQLite backing file failed.
    #[cfg(feature = "sqlite")]
    #[error("failed to open or migrate the backing store: {0}")]
    ConnectionFailed(String),
}
