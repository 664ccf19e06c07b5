//! Evidence and finding store contract.
//!
//! The store is the one shared mutable resource in the system. Its contract
//! with the core is idempotent upsert keyed by deterministic id, so concurrent
//! runs over the same inputs converge instead of racing:
//!
//! - Evidence is content-addressed. Re-persisting an id with identical
//!   content is a no-op; different content under the same id is a collision.
//! - Findings are keyed by `(dataset version, category, severity, engine)`.
//!   Re-persisting with a different content digest replaces the stored
//!   finding and logs a warning.
//! - Every read re-verifies the entity before returning it.
//!
//! [`MemoryStore`] is the in-process backend used by tests and the CLI.

mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;

use crate::dataset::DatasetVersionId;
use crate::determinism::DeterministicId;
use crate::evidence::{Evidence, EvidenceError, Finding};
use crate::orchestrator::{ReportIntegrityError, RunReport};

/// Errors raised by a store backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistenceError {
    /// No entity is stored under the key.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// The requested key.
        id: String,
    },

    /// Different content arrived under a content-addressed id.
    #[error("{kind} collision: {id} already stored with different content")]
    Collision {
        /// Entity kind.
        kind: &'static str,
        /// The colliding id.
        id: String,
    },

    /// A stored entity failed verification on write or read.
    #[error("stored entity failed verification: {0}")]
    Corrupt(#[from] EvidenceError),

    /// A stored report failed verification on read.
    #[error("stored report failed verification: {0}")]
    CorruptReport(#[from] ReportIntegrityError),

    /// The backend failed.
    #[error("storage error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

impl PersistenceError {
    pub(crate) fn poisoned() -> Self {
        Self::Backend {
            message: "lock poisoned".to_string(),
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertStatus {
    /// Nothing was stored under the key.
    Inserted,
    /// Identical content was already stored.
    Unchanged,
    /// Different content was stored and has been replaced.
    Replaced,
}

/// Receipt for a persisted evidence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Content address.
    pub id: DeterministicId,
    /// Whether the write stored anything new.
    pub status: UpsertStatus,
}

/// Receipt for a persisted finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingRef {
    /// Deterministic id.
    pub id: DeterministicId,
    /// Digest of the content now stored.
    pub content_digest: String,
    /// What the write did.
    pub status: UpsertStatus,
}

/// Evidence/finding persistence collaborator.
pub trait AssessmentStore: Send + Sync {
    /// Stores an evidence record, idempotently by id.
    ///
    /// # Errors
    ///
    /// - [`PersistenceError::Corrupt`] if the record fails verification
    /// - [`PersistenceError::Collision`] if the id holds different content
    fn persist_evidence(&self, evidence: &Evidence) -> Result<EvidenceRef, PersistenceError>;

    /// Stores a finding, idempotently by id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Corrupt`] if the finding fails
    /// verification.
    fn persist_finding(&self, finding: &Finding) -> Result<FindingRef, PersistenceError>;

    /// Stores a run report keyed by `(dataset version, run id)`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::CorruptReport`] if the report fails
    /// verification.
    fn persist_report(&self, report: &RunReport) -> Result<UpsertStatus, PersistenceError>;

    /// Loads and verifies an evidence record.
    ///
    /// # Errors
    ///
    /// - [`PersistenceError::NotFound`] if nothing is stored under `id`
    /// - [`PersistenceError::Corrupt`] if the stored record was altered
    fn load_evidence(&self, id: &DeterministicId) -> Result<Evidence, PersistenceError>;

    /// Loads and verifies a finding.
    ///
    /// # Errors
    ///
    /// - [`PersistenceError::NotFound`] if nothing is stored under `id`
    /// - [`PersistenceError::Corrupt`] if the stored finding was altered
    fn load_finding(&self, id: &DeterministicId) -> Result<Finding, PersistenceError>;

    /// Loads and verifies a run report.
    ///
    /// # Errors
    ///
    /// - [`PersistenceError::NotFound`] if no such run is stored
    /// - [`PersistenceError::CorruptReport`] if the stored report was altered
    fn load_report(
        &self,
        dataset_version_id: &DatasetVersionId,
        run_id: &DeterministicId,
    ) -> Result<RunReport, PersistenceError>;
}
