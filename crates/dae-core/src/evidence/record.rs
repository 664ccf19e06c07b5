//! Content-addressed evidence records.

use serde::{Deserialize, Serialize};

use super::error::EvidenceError;
use crate::dataset::DatasetVersionId;
use crate::determinism::{DeterministicId, content_id};
use crate::immutability::{FrozenMap, Protected, compute_seal};
use crate::rules::{RuleResult, Severity};

/// Check type recorded for evidence produced by rule evaluation.
pub const CHECK_TYPE_RULE_EVALUATION: &str = "rule_evaluation";

const EVIDENCE_DOMAIN: &str = "dae.evidence.v1";

/// Full detail backing a finding.
///
/// The identifier is the BLAKE3 content address of everything below bound to
/// the dataset version, so an edit to any field is detectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    id: DeterministicId,
    dataset_version_id: DatasetVersionId,
    result_set_id: DeterministicId,
    engine: String,
    category: String,
    severity: Severity,
    check_type: String,
    rules: Vec<RuleResult>,
    assumptions: FrozenMap,
    seal: String,
}

/// The addressed portion of an evidence record.
#[derive(Serialize)]
struct EvidenceBody<'a> {
    result_set_id: &'a DeterministicId,
    engine: &'a str,
    category: &'a str,
    severity: Severity,
    check_type: &'a str,
    rules: &'a [RuleResult],
    assumptions: &'a FrozenMap,
}

impl Evidence {
    /// Builds and seals an evidence record.
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
        check_type: &str,
        rules: Vec<RuleResult>,
        assumptions: FrozenMap,
    ) -> Result<Self, EvidenceError> {
        let id = content_id(
            EVIDENCE_DOMAIN,
            dataset_version_id.as_str(),
            &EvidenceBody {
                result_set_id: &result_set_id,
                engine,
                category,
                severity,
                check_type,
                rules: &rules,
                assumptions: &assumptions,
            },
        )?;
        let mut evidence = Self {
            id,
            dataset_version_id,
            result_set_id,
            engine: engine.to_string(),
            category: category.to_string(),
            severity,
            check_type: check_type.to_string(),
            rules,
            assumptions,
            seal: String::new(),
        };
        evidence.seal = compute_seal(&evidence)?;
        Ok(evidence)
    }

    /// Content address.
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

    /// Severity of the grouped results.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Kind of check that produced the evidence.
    #[must_use]
    pub fn check_type(&self) -> &str {
        &self.check_type
    }

    /// Full rule results, ordered by rule name.
    #[must_use]
    pub fn rules(&self) -> &[RuleResult] {
        &self.rules
    }

    /// Assumptions in force during evaluation.
    #[must_use]
    pub const fn assumptions(&self) -> &FrozenMap {
        &self.assumptions
    }

    /// Recomputes the content address and seal.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::HashMismatch`] if the content no longer
    /// matches its identifier, or [`EvidenceError::Integrity`] if the seal is
    /// broken.
    pub fn verify(&self) -> Result<(), EvidenceError> {
        let actual = content_id(
            EVIDENCE_DOMAIN,
            self.dataset_version_id.as_str(),
            &EvidenceBody {
                result_set_id: &self.result_set_id,
                engine: &self.engine,
                category: &self.category,
                severity: self.severity,
                check_type: &self.check_type,
                rules: &self.rules,
                assumptions: &self.assumptions,
            },
        )?;
        if actual != self.id {
            return Err(EvidenceError::HashMismatch {
                kind: "evidence",
                expected: self.id.to_string(),
                actual: actual.to_string(),
            });
        }
        self.verify_seal()?;
        Ok(())
    }
}

impl Protected for Evidence {
    const TYPE_NAME: &'static str = "Evidence";
    const FIELDS: &'static [&'static str] = &[
        "id",
        "dataset_version_id",
        "result_set_id",
        "engine",
        "category",
        "severity",
        "check_type",
        "rules",
        "assumptions",
        "seal",
    ];

    fn seal(&self) -> &str {
        &self.seal
    }
}
