//! Groups failing rule results into findings and evidence.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::error::EvidenceError;
use super::finding::Finding;
use super::record::{CHECK_TYPE_RULE_EVALUATION, Evidence};
use crate::dataset::DatasetVersionId;
use crate::determinism::DeterministicId;
use crate::immutability::FrozenMap;
use crate::rules::{Assessment, RuleResult, Severity};

/// Inputs to one emission pass.
#[derive(Debug, Clone, Copy)]
pub struct EmitRequest<'a> {
    /// Dataset version the results were computed over.
    pub dataset_version_id: &'a DatasetVersionId,
    /// Result-set identifier of the run.
    pub result_set_id: &'a DeterministicId,
    /// The rule engine's output.
    pub assessment: &'a Assessment,
    /// Sorted source systems of the record.
    pub source_systems: &'a [String],
    /// Assumptions in force.
    pub assumptions: &'a FrozenMap,
}

/// Evidence keyed by id, and findings ordered by `(category, severity)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    /// Evidence records keyed by content address.
    pub evidence: BTreeMap<DeterministicId, Evidence>,
    /// Findings in `(category, severity)` order.
    pub findings: Vec<Finding>,
}

/// Emitter bound to one engine identity.
#[derive(Debug, Clone)]
pub struct FindingEmitter {
    engine: String,
    engine_version: String,
}

impl FindingEmitter {
    /// Creates an emitter for an engine.
    #[must_use]
    pub fn new(engine: impl Into<String>, engine_version: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            engine_version: engine_version.into(),
        }
    }

    /// Emits one finding and one evidence record per failing
    /// `(category, severity)` group.
    ///
    /// Passed results are clean and errored results never reached a verdict,
    /// so neither produces a finding.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceError::Canonical`] if content cannot be hashed.
    pub fn emit(&self, request: &EmitRequest<'_>) -> Result<Emission, EvidenceError> {
        let mut groups: BTreeMap<(&str, Severity), Vec<&RuleResult>> = BTreeMap::new();
        for result in request.assessment.failures() {
            groups
                .entry((result.category.as_str(), result.severity))
                .or_default()
                .push(result);
        }

        let mut emission = Emission::default();
        for ((category, severity), mut members) in groups {
            members.sort_by(|a, b| a.rule.cmp(&b.rule));

            let evidence = Evidence::new(
                request.dataset_version_id.clone(),
                request.result_set_id.clone(),
                &self.engine,
                category,
                severity,
                CHECK_TYPE_RULE_EVALUATION,
                members.iter().map(|r| (*r).clone()).collect(),
                request.assumptions.clone(),
            )?;

            let detail = members
                .iter()
                .map(|r| r.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let finding = Finding::new(
                request.dataset_version_id.clone(),
                request.result_set_id.clone(),
                &self.engine,
                category,
                severity,
                detail,
                self.metadata(&members, request.source_systems),
                vec![evidence.id().clone()],
            )?;

            debug!(
                dataset_version_id = %request.dataset_version_id,
                finding_id = %finding.id(),
                evidence_id = %evidence.id(),
                category,
                severity = %severity,
                "finding emitted"
            );

            emission.evidence.insert(evidence.id().clone(), evidence);
            emission.findings.push(finding);
        }

        Ok(emission)
    }

    fn metadata(&self, members: &[&RuleResult], source_systems: &[String]) -> FrozenMap {
        let mut sorted_sources = source_systems.to_vec();
        sorted_sources.sort();
        sorted_sources.dedup();
        [
            ("engine", Value::from(self.engine.as_str())),
            ("engine_version", Value::from(self.engine_version.as_str())),
            (
                "rules",
                Value::from(members.iter().map(|r| r.rule.clone()).collect::<Vec<_>>()),
            ),
            ("source_systems", Value::from(sorted_sources)),
        ]
        .into_iter()
        .collect()
    }
}
