//! BLAKE3 hashing and hash-chain primitives.

use thiserror::Error;

/// Size of a BLAKE3 hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Type alias for a 32-byte hash.
pub type Hash = [u8; HASH_SIZE];

/// Errors that can occur while verifying a hash chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashChainError {
    /// The recorded previous hash doesn't match the predecessor's hash.
    #[error("hash chain broken at sequence {sequence}: expected {expected}, got {actual}")]
    ChainBroken {
        /// Position of the offending link.
        sequence: u64,
        /// The expected previous hash.
        expected: String,
        /// The previous hash actually recorded.
        actual: String,
    },

    /// A link's own hash doesn't match its recomputed content hash.
    #[error("entry hash mismatch at sequence {sequence}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Position of the offending link.
        sequence: u64,
        /// The recorded hash.
        expected: String,
        /// The recomputed hash.
        actual: String,
    },

    /// A hex string could not be decoded into a hash.
    #[error("invalid hash encoding: {value}")]
    InvalidEncoding {
        /// The rejected input.
        value: String,
    },
}

/// Stateless BLAKE3 hasher.
pub struct ContentHasher;

impl ContentHasher {
    /// The zero hash used as the previous hash of the first chain link.
    pub const GENESIS_PREV_HASH: Hash = [0u8; HASH_SIZE];

    /// Hashes raw content without chain linking.
    #[must_use]
    pub fn hash_content(content: &[u8]) -> Hash {
        *blake3::hash(content).as_bytes()
    }

    /// Hashes content prefixed by a domain separator.
    ///
    /// Digests from different domains never collide even when the content
    /// bytes are equal.
    #[must_use]
    pub fn hash_domain(domain: &str, content: &[u8]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(&[0x00]);
        hasher.update(content);
        *hasher.finalize().as_bytes()
    }

    /// Hashes content linked to its predecessor: `prev_hash || content`.
    #[must_use]
    pub fn hash_chained(content: &[u8], prev_hash: &Hash) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(prev_hash);
        hasher.update(content);
        *hasher.finalize().as_bytes()
    }

    /// Verifies a sequence of chain links.
    ///
    /// Each item is `(content, prev_hash, entry_hash)`.
    ///
    /// # Errors
    ///
    /// Returns the first broken link or mismatched hash.
    pub fn verify_chain<'a>(
        links: impl IntoIterator<Item = (&'a [u8], &'a Hash, &'a Hash)>,
    ) -> Result<(), HashChainError> {
        let mut expected_prev = Self::GENESIS_PREV_HASH;

        for (sequence, (content, prev_hash, entry_hash)) in (0u64..).zip(links) {
            if *prev_hash != expected_prev {
                return Err(HashChainError::ChainBroken {
                    sequence,
                    expected: hex_encode(&expected_prev),
                    actual: hex_encode(prev_hash),
                });
            }
            let computed = Self::hash_chained(content, prev_hash);
            if computed != *entry_hash {
                return Err(HashChainError::HashMismatch {
                    sequence,
                    expected: hex_encode(entry_hash),
                    actual: hex_encode(&computed),
                });
            }
            expected_prev = *entry_hash;
        }

        Ok(())
    }
}

/// Encodes a hash as lowercase hex.
#[must_use]
pub fn hex_encode(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Decodes a lowercase or uppercase hex string into a hash.
///
/// # Errors
///
/// Returns [`HashChainError::InvalidEncoding`] if the input is not exactly
/// 64 hex characters.
pub fn hex_decode(value: &str) -> Result<Hash, HashChainError> {
    let mut hash = [0u8; HASH_SIZE];
    hex::decode_to_slice(value, &mut hash).map_err(|_| HashChainError::InvalidEncoding {
        value: value.to_string(),
    })?;
    Ok(hash)
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_hash_content_deterministic() {
        let hash = ContentHasher::hash_content(b"hello world");
        assert_eq!(hash, ContentHasher::hash_content(b"hello world"));
        assert_ne!(hash, ContentHasher::hash_content(b"different"));
    }

    #[test]
    fn test_domain_separation() {
        let a = ContentHasher::hash_domain("evidence", b"payload");
        let b = ContentHasher::hash_domain("finding", b"payload");
        assert_ne!(a, b);
        assert_ne!(a, ContentHasher::hash_content(b"payload"));
    }

    #[test]
    fn test_chain_roundtrip_verifies() {
        let first = b"first".as_slice();
        let second = b"second".as_slice();
        let h1 = ContentHasher::hash_chained(first, &ContentHasher::GENESIS_PREV_HASH);
        let h2 = ContentHasher::hash_chained(second, &h1);

        let links = [
            (first, &ContentHasher::GENESIS_PREV_HASH, &h1),
            (second, &h1, &h2),
        ];
        ContentHasher::verify_chain(links).unwrap();
    }

    #[test]
    fn test_chain_detects_tampered_content() {
        let h1 = ContentHasher::hash_chained(b"first", &ContentHasher::GENESIS_PREV_HASH);
        let links = [(b"edited".as_slice(), &ContentHasher::GENESIS_PREV_HASH, &h1)];
        assert!(matches!(
            ContentHasher::verify_chain(links),
            Err(HashChainError::HashMismatch { sequence: 0, .. })
        ));
    }

    #[test]
    fn test_chain_detects_removed_link() {
        let h1 = ContentHasher::hash_chained(b"first", &ContentHasher::GENESIS_PREV_HASH);
        let h2 = ContentHasher::hash_chained(b"second", &h1);
        let links = [(b"second".as_slice(), &h1, &h2)];
        assert!(matches!(
            ContentHasher::verify_chain(links),
            Err(HashChainError::ChainBroken { sequence: 0, .. })
        ));
    }

    #[test]
    fn test_hex_decode_rejects_bad_length() {
        assert!(hex_decode("0123").is_err());
        let hash = ContentHasher::hash_content(b"x");
        assert_eq!(hex_decode(&hex_encode(&hash)).unwrap(), hash);
    }
}
