use thiserror::Error;

/// Failures raised by the pure tree algorithms and proof verifier
/// (spec §7). Every variant here is reachable from untrusted input — a
/// peer's proof, not a local programming error — except where noted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A range query was given `start >= end` with both bounds present.
    /// This is a caller bug, not an adversarial input; the library still
    /// returns it rather than panicking so the caller can recover.
    #[error("invalid range: start >= end")]
    InvalidRange,

    /// A proof was constructed or received with zero leaves.
    #[error("proof contains no leaves")]
    EmptyProof,

    /// The proof's inner-path/leaf lengths didn't line up, or leaves
    /// remained after the inner path was exhausted, during `COMPUTE_ROOT`.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// The proof's re-derived root digest did not match the expected
    /// root.
    #[error("proof root does not match expected root")]
    RootMismatch,

    /// An absence proof actually contains the queried key, at leaf index
    /// `.0` within the proof.
    #[error("key is present in the tree at index {0}, absence disproved")]
    AbsenceDisproved(u64),

    /// The proof does not satisfy any of the absence rules (spec §4.4)
    /// for the queried key.
    #[error("absence not proven: {0}")]
    AbsenceNotProven(String),

    /// The verifier's recomputed leaf digest did not match the digest in
    /// the proof.
    #[error("value digest does not match the proof's leaf")]
    ValueDigestMismatch,

    /// `verify_item` was called for a key absent from the proof's leaves.
    #[error("key is not present in the proof")]
    KeyNotInProof,
}
