/// Accumulates a canonical pre-image for a leaf or inner node digest.
///
/// Mirrors spec §4.1's encoding exactly: `int8` is a single byte,
/// `varint` is unsigned LEB128 of the value's bit pattern (a negative
/// version's two's-complement bits, reinterpreted as `u64`, so versions
/// round-trip even though they are logically signed), and
/// `length_prefixed(b)` is `varint(len(b)) || b`.
pub(crate) struct PreimageWriter {
    buffer: [u8; 10],
    bytes: Vec<u8>,
}

impl PreimageWriter {
    pub(crate) fn new() -> Self {
        Self {
            buffer: [0u8; 10],
            bytes: Vec::new(),
        }
    }

    pub(crate) fn write_int8(&mut self, b: u8) -> &mut Self {
        self.bytes.push(b);
        self
    }

    pub(crate) fn write_varint(&mut self, value: u64) -> &mut Self {
        let len = leb128::write::unsigned(&mut self.buffer.as_mut_slice(), value)
            .unwrap_or_else(|_| unreachable!("10-byte buffer always fits a u64 LEB128 encoding"));
        self.bytes.extend_from_slice(&self.buffer[..len]);
        self
    }

    /// Encodes a signed version the way spec §4.1 requires: the two's
    /// complement bit pattern of a negative version is an unsigned LEB128
    /// large-magnitude value, not a sign-and-magnitude encoding.
    pub(crate) fn write_version(&mut self, version: i64) -> &mut Self {
        self.write_varint(version as u64)
    }

    pub(crate) fn write_length_prefixed(&mut self, b: &[u8]) -> &mut Self {
        self.write_varint(b.len() as u64);
        self.bytes.extend_from_slice(b);
        self
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefixed_matches_manual_encoding() {
        let mut w = PreimageWriter::new();
        w.write_length_prefixed(b"key");
        assert_eq!(w.into_bytes(), vec![3, b'k', b'e', b'y']);
    }

    #[test]
    fn test_negative_version_encodes_as_large_magnitude() {
        let mut w = PreimageWriter::new();
        w.write_version(-1);
        // -1i64 as u64 is u64::MAX, a 10-byte LEB128 value.
        assert_eq!(w.into_bytes().len(), 10);
    }
}
