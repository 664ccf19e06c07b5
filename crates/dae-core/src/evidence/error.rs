//! Error types for evidence and finding construction.

use thiserror::Error;

use crate::determinism::CanonicalError;
use crate::immutability::ImmutabilityViolation;

/// Errors that can occur while building or verifying evidence and findings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EvidenceError {
    /// Content could not be canonicalized for hashing.
    #[error("evidence content not canonicalizable: {0}")]
    Canonical(#[from] CanonicalError),

    /// The stored identifier doesn't match the recomputed content address.
    #[error("content hash mismatch for {kind}: expected {expected}, got {actual}")]
    HashMismatch {
        /// `evidence` or `finding`.
        kind: &'static str,
        /// The recorded identifier or digest.
        expected: String,
        /// The recomputed value.
        actual: String,
    },

    /// A finding references evidence that was not emitted alongside it.
    #[error("finding {finding_id} references unknown evidence {evidence_id}")]
    DanglingEvidence {
        /// The referencing finding.
        finding_id: String,
        /// The missing evidence.
        evidence_id: String,
    },

    /// The seal check failed.
    #[error(transparent)]
    Integrity(#[from] ImmutabilityViolation),
}
