//! Deterministically identified findings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::EvidenceError;
use crate::dataset::DatasetVersionId;
use crate::determinism::{DeterministicId, content_digest, generate_id};
use crate::immutability::{FrozenMap, Protected, compute_seal};
use crate::rules::Severity;

/// Summarized outcome for one `(category, severity)` group.
///
/// The identifier depends only on the dataset version, category, severity
/// and engine, so the same logical signal keeps its identity across reruns.
/// `content_digest` covers the summarized content and changes whenever the
/// detail does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    id: DeterministicId,
    dataset_version_id: DatasetVersionId,
    result_set_id: DeterministicId,
    engine: String,
    category: String,
    severity: Severity,
    detail: String,
    metadata: FrozenMap,
    evidence_ids: Vec<DeterministicId>,
    content_digest: String,
    seal: String,
}

#[derive(Serialize)]
struct FindingContent<'a> {
    category: &'a str,
    severity: Severity,
    detail: &'a str,
    metadata: &'a FrozenMap,
    evidence_ids: &'a [DeterministicId],
}

impl Finding {
    /// Derives the identifier a finding for this signal would carry.
    #[must_use]
    pub fn derive_id(
        dataset_version_id: &DatasetVersionId,
        engine: &str,
        category: &str,
        severity: Severity,
    ) -> DeterministicId {
        generate_id(dataset_version_id.as_str(), category, &[severity.as_str(), engine])
    }

    /// Builds and seals a finding.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Canonical`] if the content cannot be hashed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dataset_version_id: DatasetVersionId,
        result_set_id: DeterministicId,
        engine: &str,
        category: &str,
        severity: Severity,
        detail: String,
        metadata: FrozenMap,
        evidence_ids: Vec<DeterministicId>,
    ) -> Result<Self, EvidenceError> {
        let id = Self::derive_id(&dataset_version_id, engine, category, severity);
        let digest = content_digest(&FindingContent {
            category,
            severity,
            detail: &detail,
            metadata: &metadata,
            evidence_ids: &evidence_ids,
        })?;
        let mut finding = Self {
            id,
            dataset_version_id,
            result_set_id,
            engine: engine.to_string(),
            category: category.to_string(),
            severity,
            detail,
            metadata,
            evidence_ids,
            content_digest: digest,
            seal: String::new(),
        };
        finding.seal = compute_seal(&finding)?;
        Ok(finding)
    }

    /// Deterministic identifier.
    #[must_use]
    pub const fn id(&self) -> &DeterministicId {
        &self.id
    }

    /// Bound dataset version.
    #[must_use]
    pub const fn dataset_version_id(&self) -> &DatasetVersionId {
        &self.dataset_version_id
    }

    /// Bound result set.
    #[must_use]
    pub const fn result_set_id(&self) -> &DeterministicId {
        &self.result_set_id
    }

    /// Producing engine.
    #[must_use]
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Risk category.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Human-readable detail.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Read-only metadata, including sorted `source_systems`.
    #[must_use]
    pub const fn metadata(&self) -> &FrozenMap {
        &self.metadata
    }

    /// Sorted source systems recorded in metadata.
    #[must_use]
    pub fn source_systems(&self) -> Vec<&str> {
        self.metadata
            .get("source_systems")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Backing evidence identifiers.
    #[must_use]
    pub fn evidence_ids(&self) -> &[DeterministicId] {
        &self.evidence_ids
    }

    /// Digest of the summarized content.
    #[must_use]
    pub fn content_digest(&self) -> &str {
        &self.content_digest
    }

    /// Recomputes the identifier, content digest and seal.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::HashMismatch`] or [`EvidenceError::Integrity`]
    /// if any was altered after construction.
    pub fn verify(&self) -> Result<(), EvidenceError> {
        let id = Self::derive_id(
            &self.dataset_version_id,
            &self.engine,
            &self.category,
            self.severity,
        );
        if id != self.id {
            return Err(EvidenceError::HashMismatch {
                kind: "finding",
                expected: self.id.to_string(),
                actual: id.to_string(),
            });
        }
        let digest = content_digest(&FindingContent {
            category: &self.category,
            severity: self.severity,
            detail: &self.detail,
            metadata: &self.metadata,
            evidence_ids: &self.evidence_ids,
        })?;
        if digest != self.content_digest {
            return Err(EvidenceError::HashMismatch {
                kind: "finding",
                expected: self.content_digest.clone(),
                actual: digest,
            });
        }
        self.verify_seal()?;
        Ok(())
    }
}

impl Protected for Finding {
    const TYPE_NAME: &'static str = "Finding";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "dataset_version_id",
        "result_set_id",
        "engine",
        "category",
        "severity",
        "detail",
        "metadata",
        "evidence_ids",
        "content_digest",
        "seal",
    ];

    fn seal(&self) -> &str {
        &self.seal
    }
}
