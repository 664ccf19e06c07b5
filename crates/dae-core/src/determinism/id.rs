//! Deterministic identifier generation.
//!
//! An identifier is the truncated BLAKE3 digest of a canonical,
//! length-prefixed, unit-separator-joined string:
//!
//! ```text
//! dae.id.v1 \x1f <len>:<dataset_version_id> \x1f <len>:<category> \x1f <len>:<d1> ...
//! ```
//!
//! Discriminators are sorted before joining, so callers may pass them in any
//! order. Nothing here depends on process state, hash randomization or memory
//! addresses; the same inputs produce the same ID in any runtime that
//! implements the scheme.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::canonical::{CanonicalError, canonical_json};
use crate::crypto::ContentHasher;

/// Frozen identifier scheme tag. Changing it re-keys every finding.
pub const ID_SCHEME: &str = "dae.id.v1";

/// Hex length of a generated (128-bit) identifier.
pub const ID_HEX_LEN: usize = 32;

/// Hex length of a content identifier (full 256-bit digest).
const CONTENT_ID_HEX_LEN: usize = 64;

const UNIT_SEPARATOR: char = '\u{1f}';

/// A deterministic identifier: 32 (generated) or 64 (content) lowercase hex
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeterministicId(String);

impl DeterministicId {
    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses an identifier previously produced by this module.
    ///
    /// # Errors
    ///
    /// Returns the rejected input if it is not 32 or 64 lowercase hex
    /// characters.
    pub fn parse(value: &str) -> Result<Self, String> {
        let well_formed = (value.len() == ID_HEX_LEN || value.len() == CONTENT_ID_HEX_LEN)
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(value.to_string()))
        } else {
            Err(format!("malformed deterministic id: {value:?}"))
        }
    }
}

impl TryFrom<String> for DeterministicId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeterministicId> for String {
    fn from(id: DeterministicId) -> Self {
        id.0
    }
}

impl fmt::Display for DeterministicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeterministicId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn push_field(canonical: &mut String, field: &str) {
    canonical.push(UNIT_SEPARATOR);
    canonical.push_str(&field.len().to_string());
    canonical.push(':');
    canonical.push_str(field);
}

/// Derives a stable identifier from a dataset version, a category and an
/// order-insensitive set of discriminators.
#[must_use]
pub fn generate_id<S: AsRef<str>>(
    dataset_version_id: &str,
    category: &str,
    discriminators: &[S],
) -> DeterministicId {
    let mut sorted: Vec<&str> = discriminators.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let mut canonical = String::from(ID_SCHEME);
    push_field(&mut canonical, dataset_version_id);
    push_field(&mut canonical, category);
    for discriminator in sorted {
        push_field(&mut canonical, discriminator);
    }

    let digest = ContentHasher::hash_content(canonical.as_bytes());
    DeterministicId(hex::encode(&digest[..ID_HEX_LEN / 2]))
}

/// Hex BLAKE3 digest of a value's canonical JSON encoding.
///
/// # Errors
///
/// Returns [`CanonicalError`] if the value cannot be canonicalized.
pub fn content_digest<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let bytes = canonical_json(value)?;
    Ok(hex::encode(ContentHasher::hash_content(&bytes)))
}

/// Content-addressed identifier bound to a domain and a dataset version.
///
/// # Errors
///
/// Returns [`CanonicalError`] if the content cannot be canonicalized.
pub fn content_id<T: Serialize + ?Sized>(
    domain: &str,
    dataset_version_id: &str,
    content: &T,
) -> Result<DeterministicId, CanonicalError> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(dataset_version_id.as_bytes());
    bytes.push(0x1f);
    bytes.extend_from_slice(&canonical_json(content)?);
    let digest = ContentHasher::hash_domain(domain, &bytes);
    Ok(DeterministicId(hex::encode(digest)))
}
