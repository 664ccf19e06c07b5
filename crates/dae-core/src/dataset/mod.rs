//! Dataset snapshots and the ingestion collaborator contract.
//!
//! A [`DatasetVersion`] is created once by ingestion and is read-only for the
//! life of the process. Everything downstream references it by
//! [`DatasetVersionId`] only; payload content is reached through the
//! [`RawRecord`] view and is never copied into findings or evidence.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::determinism::{CanonicalError, content_digest};
use crate::immutability::{ImmutabilityViolation, Protected, compute_seal};

/// Maximum accepted length of a dataset version identifier, in bytes.
pub const MAX_DATASET_VERSION_ID_LEN: usize = 256;

/// Errors raised by dataset construction and loading.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DatasetError {
    /// The identifier is empty, too long, or contains control characters.
    #[error("invalid dataset version id {value:?}: {reason}")]
    InvalidId {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The ingestion collaborator has no such version.
    #[error("dataset version not found: {dataset_version_id}")]
    NotFound {
        /// The requested version.
        dataset_version_id: String,
    },

    /// The payload could not be canonicalized for digesting.
    #[error("dataset version {dataset_version_id} payload is not canonicalizable: {source}")]
    Canonical {
        /// The affected version.
        dataset_version_id: String,
        /// The underlying error.
        #[source]
        source: CanonicalError,
    },

    /// A stored snapshot failed its integrity check.
    #[error(transparent)]
    Integrity(#[from] ImmutabilityViolation),

    /// The collaborator's backend failed.
    #[error("dataset source error for {dataset_version_id}: {message}")]
    Source {
        /// The affected version.
        dataset_version_id: String,
        /// Description of the failure.
        message: String,
    },
}

/// Opaque, globally unique dataset version identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetVersionId(String);

impl DatasetVersionId {
    /// Validates and wraps an identifier supplied by ingestion.
    ///
    /// Surrounding whitespace is trimmed; nothing else is rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidId`] for empty, oversized or
    /// control-character-bearing identifiers.
    pub fn new(value: &str) -> Result<Self, DatasetError> {
        let trimmed = value.trim();
        let reason = if trimmed.is_empty() {
            Some("empty")
        } else if trimmed.len() > MAX_DATASET_VERSION_ID_LEN {
            Some("too long")
        } else if trimmed.chars().any(char::is_control) {
            Some("contains control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(DatasetError::InvalidId {
                value: value.to_string(),
                reason,
            }),
            None => Ok(Self(trimmed.to_string())),
        }
    }

    /// Mints a fresh time-ordered identifier (`dv-<uuidv7>`).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("dv-{}", Uuid::now_v7()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DatasetVersionId {
    type Error = DatasetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<DatasetVersionId> for String {
    fn from(id: DatasetVersionId) -> Self {
        id.0
    }
}

impl fmt::Display for DatasetVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable, uniquely identified dataset snapshot header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetVersion {
    id: DatasetVersionId,
    content_digest: String,
    created_at: DateTime<Utc>,
    seal: String,
}

impl DatasetVersion {
    /// Creates a version header over the given payload.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Canonical`] if the payload cannot be digested.
    pub fn new(
        id: DatasetVersionId,
        payload: &Value,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DatasetError> {
        let dataset_version_id = id.to_string();
        let canonical_err = |source: CanonicalError| DatasetError::Canonical {
            dataset_version_id: dataset_version_id.clone(),
            source,
        };
        let digest = content_digest(payload).map_err(canonical_err)?;
        let mut version = Self {
            id,
            content_digest: digest,
            created_at,
            seal: String::new(),
        };
        version.seal = compute_seal(&version).map_err(canonical_err)?;
        Ok(version)
    }

    /// The version identifier.
    #[must_use]
    pub const fn id(&self) -> &DatasetVersionId {
        &self.id
    }

    /// Hex BLAKE3 digest of the canonical payload.
    #[must_use]
    pub fn content_digest(&self) -> &str {
        &self.content_digest
    }

    /// When ingestion created the version.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Protected for DatasetVersion {
    const TYPE_NAME: &'static str = "DatasetVersion";
    const FIELDS: &'static [&'static str] = &["id", "content_digest", "created_at", "seal"];

    fn seal(&self) -> &str {
        &self.seal
    }
}

/// Read-only view of a normalized payload bound to one dataset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    dataset_version_id: DatasetVersionId,
    payload: Arc<Value>,
    seal: String,
}

impl RawRecord {
    /// Wraps a payload.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Canonical`] if the payload cannot be sealed.
    pub fn new(dataset_version_id: DatasetVersionId, payload: Value) -> Result<Self, DatasetError> {
        let mut record = Self {
            dataset_version_id,
            payload: Arc::new(payload),
            seal: String::new(),
        };
        record.seal = compute_seal(&record).map_err(|source| DatasetError::Canonical {
            dataset_version_id: record.dataset_version_id.to_string(),
            source,
        })?;
        Ok(record)
    }

    /// The owning dataset version.
    #[must_use]
    pub const fn dataset_version_id(&self) -> &DatasetVersionId {
        &self.dataset_version_id
    }

    /// The payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl Protected for RawRecord {
    const TYPE_NAME: &'static str = "RawRecord";
    const FIELDS: &'static [&'static str] = &["dataset_version_id", "payload", "seal"];

    fn seal(&self) -> &str {
        &self.seal
    }
}

/// Ingestion collaborator: resolves a dataset version to its snapshot.
pub trait DatasetSource: Send + Sync {
    /// Loads a version header and its payload view.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for unknown versions, or another
    /// [`DatasetError`] if the backend fails.
    fn load_dataset_version(
        &self,
        id: &DatasetVersionId,
    ) -> Result<(DatasetVersion, RawRecord), DatasetError>;
}

/// In-memory dataset source.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatasetSource {
    snapshots: Arc<RwLock<HashMap<DatasetVersionId, (DatasetVersion, RawRecord)>>>,
}

impl MemoryDatasetSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a snapshot, returning its version header.
    ///
    /// Re-registering an existing id with identical content is a no-op;
    /// different content is rejected since versions never change.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Canonical`] if the payload cannot be sealed, or
    /// [`DatasetError::Source`] if the id is already bound to other content.
    pub fn insert(
        &self,
        id: DatasetVersionId,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Result<DatasetVersion, DatasetError> {
        let version = DatasetVersion::new(id.clone(), &payload, created_at)?;
        let record = RawRecord::new(id.clone(), payload)?;
        let mut snapshots = self.snapshots.write().map_err(|_| DatasetError::Source {
            dataset_version_id: id.to_string(),
            message: "lock poisoned".to_string(),
        })?;
        if let Some((existing, _)) = snapshots.get(&id) {
            if existing.content_digest() != version.content_digest() {
                return Err(DatasetError::Source {
                    dataset_version_id: id.to_string(),
                    message: "dataset version already bound to different content".to_string(),
                });
            }
            return Ok(existing.clone());
        }
        snapshots.insert(id, (version.clone(), record));
        Ok(version)
    }
}

impl DatasetSource for MemoryDatasetSource {
    fn load_dataset_version(
        &self,
        id: &DatasetVersionId,
    ) -> Result<(DatasetVersion, RawRecord), DatasetError> {
        let snapshots = self.snapshots.read().map_err(|_| DatasetError::Source {
            dataset_version_id: id.to_string(),
            message: "lock poisoned".to_string(),
        })?;
        let (version, record) = snapshots.get(id).ok_or_else(|| DatasetError::NotFound {
            dataset_version_id: id.to_string(),
        })?;
        version.verify_seal()?;
        record.verify_seal()?;
        Ok((version.clone(), record.clone()))
    }
}
