//! Run requests and the assembled run report.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::audit::{AuditError, AuditLogEntry, AuditSummary, AuditTrail, format_risk_line};
use crate::dataset::DatasetVersionId;
use crate::determinism::{CanonicalError, DeterministicId};
use crate::evidence::{Evidence, EvidenceError, Finding};
use crate::immutability::seal_of;
use crate::rules::{Assessment, RuleMessage, RuleOutcome, RuleResult};

/// Seal domain of run reports.
pub const REPORT_SEAL_DOMAIN: &str = "RunReport";

/// Caller input for one run.
///
/// The id and payload are optional so a missing value surfaces as a typed
/// error instead of an implicit default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Dataset version to assess.
    pub dataset_version_id: Option<String>,
    /// Normalized payload for that version.
    pub payload: Option<Value>,
    /// Logical start of the run; part of the run id.
    pub started_at: DateTime<Utc>,
    /// Opaque run parameters, digested into the result-set id.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Assumptions recorded on evidence; override configured defaults.
    #[serde(default)]
    pub assumptions: BTreeMap<String, Value>,
}

impl RunRequest {
    /// Request with no parameters or assumptions.
    #[must_use]
    pub fn new(
        dataset_version_id: impl Into<String>,
        payload: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            dataset_version_id: Some(dataset_version_id.into()),
            payload: Some(payload),
            started_at,
            parameters: BTreeMap::new(),
            assumptions: BTreeMap::new(),
        }
    }

    /// Adds a run parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Adds an assumption.
    #[must_use]
    pub fn with_assumption(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assumptions.insert(key.into(), value.into());
        self
    }
}

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every rule passed.
    Passed,
    /// Only warning-severity rules failed.
    PassedWithWarnings,
    /// At least one error-severity rule failed.
    Failed,
    /// At least one rule broke during evaluation.
    Degraded,
}

impl RunStatus {
    /// Derives the status from an assessment.
    #[must_use]
    pub fn from_assessment(assessment: &Assessment) -> Self {
        if assessment.has_errored_rules() {
            Self::Degraded
        } else if !assessment.errors.is_empty() {
            Self::Failed
        } else if assessment.warnings.is_empty() {
            Self::Passed
        } else {
            Self::PassedWithWarnings
        }
    }

    /// Canonical snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::PassedWithWarnings => "passed_with_warnings",
            Self::Failed => "failed",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored report failed re-verification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportIntegrityError {
    /// An evidence record or finding was altered.
    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    /// The audit trail was altered.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// An evidence record is filed under an id it does not hash to.
    #[error("evidence filed under {key} but identifies as {id}")]
    MisfiledEvidence {
        /// Map key.
        key: String,
        /// Record's own id.
        id: String,
    },

    /// A field disagrees with the data it is derived from.
    #[error("report field {field} is inconsistent: {reason}")]
    Inconsistent {
        /// The offending field.
        field: &'static str,
        /// What disagrees.
        reason: String,
    },

    /// The report content no longer matches its seal.
    #[error("report seal mismatch: expected {expected}, got {actual}")]
    SealMismatch {
        /// Seal recomputed from the content.
        expected: String,
        /// Seal carried by the report.
        actual: String,
    },

    /// The report cannot be canonicalized.
    #[error("report not canonicalizable: {0}")]
    Canonical(#[from] CanonicalError),
}

fn inconsistent(field: &'static str, reason: impl Into<String>) -> ReportIntegrityError {
    ReportIntegrityError::Inconsistent {
        field,
        reason: reason.into(),
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Engine name.
    pub engine: String,
    /// Engine version.
    pub engine_version: String,
    /// Identifier of this run.
    pub run_id: DeterministicId,
    /// Identifier of the (dataset version, engine, configuration, parameters)
    /// result set.
    pub result_set_id: DeterministicId,
    /// Dataset version assessed.
    pub dataset_version_id: DatasetVersionId,
    /// Logical start time.
    pub started_at: DateTime<Utc>,
    /// Overall verdict.
    pub status: RunStatus,
    /// `true` iff no error-severity failure and no errored rule.
    pub is_valid: bool,
    /// Sorted source systems of the record.
    pub source_systems: Vec<String>,
    /// Every rule result, in registration order.
    pub results: Vec<RuleResult>,
    /// Rule name to outcome.
    pub rule_results: BTreeMap<String, RuleOutcome>,
    /// Hard failures and errored rules.
    pub errors: Vec<RuleMessage>,
    /// Soft failures.
    pub warnings: Vec<RuleMessage>,
    /// Findings in `(category, severity)` order.
    pub findings: Vec<Finding>,
    /// Evidence keyed by content address.
    pub evidence: BTreeMap<DeterministicId, Evidence>,
    /// The run's audit entries.
    pub audit_trail: Vec<AuditLogEntry>,
    /// Counts over `audit_trail`.
    pub audit_summary: AuditSummary,
    /// The compliance line, when the run surfaced risks.
    pub risk_line: Option<String>,
    /// Digest over every other field, taken at assembly.
    pub seal: String,
}

impl RunReport {
    /// Finding ids in report order.
    #[must_use]
    pub fn finding_ids(&self) -> Vec<&DeterministicId> {
        self.findings.iter().map(Finding::id).collect()
    }

    /// Distinct finding categories in report order.
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for finding in &self.findings {
            if !categories.contains(&finding.category()) {
                categories.push(finding.category());
            }
        }
        categories
    }

    /// Digest over every field but `seal`.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the report cannot be canonicalized.
    pub fn compute_seal(&self) -> Result<String, CanonicalError> {
        seal_of(REPORT_SEAL_DOMAIN, self)
    }

    /// Re-verifies the report.
    ///
    /// Checks every evidence id, finding seal, evidence link and the audit
    /// chain; that the verdict fields, findings, risk line and audit summary
    /// agree with the rule results and entries they derive from; and finally
    /// the report seal, which anchors the whole content including the audit
    /// chain head.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReportIntegrityError`] found.
    pub fn verify(&self) -> Result<(), ReportIntegrityError> {
        for (key, evidence) in &self.evidence {
            evidence.verify()?;
            if key != evidence.id() {
                return Err(ReportIntegrityError::MisfiledEvidence {
                    key: key.to_string(),
                    id: evidence.id().to_string(),
                });
            }
            if evidence.dataset_version_id() != &self.dataset_version_id
                || evidence.result_set_id() != &self.result_set_id
            {
                return Err(inconsistent(
                    "evidence",
                    format!("{key} belongs to another run"),
                ));
            }
        }
        for finding in &self.findings {
            finding.verify()?;
            if finding.dataset_version_id() != &self.dataset_version_id
                || finding.result_set_id() != &self.result_set_id
            {
                return Err(inconsistent(
                    "findings",
                    format!("{} belongs to another run", finding.id()),
                ));
            }
            for evidence_id in finding.evidence_ids() {
                if !self.evidence.contains_key(evidence_id) {
                    return Err(EvidenceError::DanglingEvidence {
                        finding_id: finding.id().to_string(),
                        evidence_id: evidence_id.to_string(),
                    }
                    .into());
                }
            }
        }
        AuditTrail::verify_chain(&self.audit_trail)?;

        self.verify_verdict()?;
        self.verify_audit_summary()?;

        let expected = self.compute_seal()?;
        if expected != self.seal {
            return Err(ReportIntegrityError::SealMismatch {
                expected,
                actual: self.seal.clone(),
            });
        }
        Ok(())
    }

    fn verify_verdict(&self) -> Result<(), ReportIntegrityError> {
        let assessment = Assessment::from_results(self.results.clone());
        if assessment.rule_results != self.rule_results {
            return Err(inconsistent("rule_results", "does not match results"));
        }
        if assessment.errors != self.errors {
            return Err(inconsistent("errors", "does not match results"));
        }
        if assessment.warnings != self.warnings {
            return Err(inconsistent("warnings", "does not match results"));
        }
        if assessment.is_valid != self.is_valid {
            return Err(inconsistent(
                "is_valid",
                format!("results imply {}", assessment.is_valid),
            ));
        }
        let status = RunStatus::from_assessment(&assessment);
        if status != self.status {
            return Err(inconsistent("status", format!("results imply {status}")));
        }

        let risks = assessment.risk_messages();
        let risk_line = (!risks.is_empty()).then(|| {
            format_risk_line(
                &self.engine,
                self.dataset_version_id.as_str(),
                &self.source_systems,
                &risks,
            )
        });
        if risk_line != self.risk_line {
            return Err(inconsistent("risk_line", "does not match results"));
        }

        let expected: BTreeSet<DeterministicId> = assessment
            .failures()
            .map(|r| {
                Finding::derive_id(&self.dataset_version_id, &self.engine, &r.category, r.severity)
            })
            .collect();
        let actual: BTreeSet<DeterministicId> = self.findings.iter().map(|f| f.id().clone()).collect();
        if expected != actual || actual.len() != self.findings.len() {
            return Err(inconsistent(
                "findings",
                format!(
                    "results imply {} findings, report carries {}",
                    expected.len(),
                    self.findings.len()
                ),
            ));
        }
        Ok(())
    }

    fn verify_audit_summary(&self) -> Result<(), ReportIntegrityError> {
        if let Some(entry) = self
            .audit_trail
            .iter()
            .find(|e| e.dataset_version_id != self.dataset_version_id)
        {
            return Err(inconsistent(
                "audit_trail",
                format!("entry {} records another dataset version", entry.sequence),
            ));
        }
        if AuditSummary::from_entries(&self.audit_trail) != self.audit_summary {
            return Err(inconsistent("audit_summary", "does not match audit_trail"));
        }
        Ok(())
    }
}
