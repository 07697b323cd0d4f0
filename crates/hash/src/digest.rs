use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// A fixed-width digest produced by a [`crate::Hasher`].
///
/// `Digest` is not const-generic on length: the [`crate::Hasher`] contract
/// is pluggable, and a hypothetical SHA3-512 hasher would need 64 bytes
/// rather than SHA-256's 32. Equality and ordering compare the raw bytes;
/// ordering exists only so digests can sit in a `BTreeMap` or be asserted
/// against in tests, not because digests are meaningfully ordered.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Digest(pub(crate) Vec<u8>);

impl Digest {
    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The digest length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this digest carries no bytes. Never true for a digest
    /// produced by a [`crate::Hasher`]; provided for completeness.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0))
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(DigestError::UppercaseHex);
        }
        Ok(Digest(hex::decode(s)?))
    }
}

/// Errors parsing a [`Digest`] from its hex string form.
#[derive(Error, Debug)]
pub enum DigestError {
    /// The string contained uppercase hex digits; digests are always
    /// displayed and parsed in lowercase.
    #[error("digest contained uppercase hex values")]
    UppercaseHex,

    /// The string was not valid hexadecimal.
    #[error("hexadecimal decode failed: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Self::from_str(&String::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let digest = Digest::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let encoded = digest.to_string();
        assert_eq!(encoded, "deadbeef");
        assert_eq!(encoded.parse::<Digest>().unwrap(), digest);
    }

    #[test]
    fn test_rejects_uppercase() {
        assert!("DEADBEEF".parse::<Digest>().is_err());
    }
}
