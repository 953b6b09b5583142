//! Content fingerprints
//!
//! A fingerprint is the lowercase hex MD5 of an entity's bytes, the same
//! representation the store keeps in its `md5sum_*` columns. Two contents
//! with equal fingerprints are treated as identical; bytes are never compared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded MD5 digest of some content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of raw bytes
    pub fn of(data: &[u8]) -> Self {
        Self(hex::encode(md5::compute(data).0))
    }

    /// Parse a stored fingerprint, normalizing to lowercase
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 16 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(Self(hex::encode(bytes)))
    }

    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of a nullable stored column. Malformed values compare unequal
/// to every real fingerprint, which forces a content rewrite.
pub(crate) fn stored(value: Option<&str>) -> Option<Fingerprint> {
    value.and_then(|v| Fingerprint::from_hex(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_known_digest() {
        assert_eq!(Fingerprint::of(b"").as_str(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(Fingerprint::of(b"hello").as_str(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_fingerprint_deterministic() {
        assert_eq!(Fingerprint::of(b"1 2\n"), Fingerprint::of(b"1 2\n"));
        assert_ne!(Fingerprint::of(b"1 2\n"), Fingerprint::of(b"1 2"));
    }

    #[test]
    fn test_fingerprint_from_hex_normalizes_case() {
        let parsed = Fingerprint::from_hex("5D41402ABC4B2A76B9719D911017C592").unwrap();
        assert_eq!(parsed, Fingerprint::of(b"hello"));
    }

    #[test]
    fn test_fingerprint_from_hex_rejects_wrong_length() {
        assert!(Fingerprint::from_hex("abcd").is_err());
        assert!(Fingerprint::from_hex("not hex at all").is_err());
    }

    #[test]
    fn test_stored_column() {
        assert_eq!(stored(None), None);
        assert_eq!(stored(Some("garbage")), None);
        assert_eq!(stored(Some("d41d8cd98f00b204e9800998ecf8427e")), Some(Fingerprint::of(b"")));
    }
}
