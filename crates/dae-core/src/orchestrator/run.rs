//! The run orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::error::RunError;
use super::report::{RunReport, RunRequest, RunStatus};
use crate::audit::{AuditAction, AuditError, AuditTrail, Clock, SystemClock};
use crate::dataset::{DatasetVersionId, RawRecord};
use crate::determinism::{DeterministicId, content_digest, generate_id};
use crate::evidence::{EmitRequest, FindingEmitter};
use crate::immutability::{FrozenMap, ImmutabilityGuard, Protected};
use crate::rules::{Assessment, RuleContext, RuleOutcome, RuleSet};

/// A domain engine: a record type plus the rules that assess it.
pub trait AssessmentEngine: Send + Sync {
    /// Engine name; prefixes the compliance line and scopes result-set ids.
    const NAME: &'static str;
    /// Engine version; part of every result-set id.
    const VERSION: &'static str;

    /// Domain record parsed from the normalized payload.
    type Record: DeserializeOwned;

    /// Configuration the rules were built from.
    type Config: Serialize;

    /// The configuration behind [`AssessmentEngine::rules`]. Part of every
    /// result-set id, so runs under different settings never share one.
    fn config(&self) -> &Self::Config;

    /// The engine's rules.
    fn rules(&self) -> &RuleSet<Self::Record>;

    /// Source systems the record came from.
    fn source_systems(&self, record: &Self::Record) -> Vec<String>;
}

/// Object-safe view of an orchestrator, used by the registry and service.
pub trait EngineRunner: Send + Sync {
    /// Engine name.
    fn engine_name(&self) -> &'static str;

    /// Engine version.
    fn engine_version(&self) -> &'static str;

    /// Registered rule names, in registration order.
    fn rule_names(&self) -> Vec<String>;

    /// Runs one assessment.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run`].
    fn run(&self, request: &RunRequest) -> Result<RunReport, RunError>;
}

#[derive(Serialize)]
struct RunSettings<'a, C> {
    configuration: &'a C,
    parameters: &'a BTreeMap<String, Value>,
}

/// Stateless pipeline: validate, parse, evaluate, emit, audit, report.
pub struct Orchestrator<E> {
    engine: E,
    emitter: FindingEmitter,
    clock: Arc<dyn Clock>,
    default_assumptions: BTreeMap<String, Value>,
}

impl<E> fmt::Debug for Orchestrator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("emitter", &self.emitter)
            .field("clock", &self.clock)
            .field("default_assumptions", &self.default_assumptions)
            .finish_non_exhaustive()
    }
}

impl<E: AssessmentEngine> Orchestrator<E> {
    /// Wraps an engine. Installs the immutability guard if needed.
    #[must_use]
    pub fn new(engine: E) -> Self {
        ImmutabilityGuard::install();
        Self {
            engine,
            emitter: FindingEmitter::new(E::NAME, E::VERSION),
            clock: Arc::new(SystemClock),
            default_assumptions: BTreeMap::new(),
        }
    }

    /// Stamps audit entries from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Assumptions recorded on evidence unless a request overrides them.
    #[must_use]
    pub fn with_assumptions(mut self, assumptions: BTreeMap<String, Value>) -> Self {
        self.default_assumptions = assumptions;
        self
    }

    /// The wrapped engine.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs one assessment.
    ///
    /// Holds no state between calls; concurrent calls are independent.
    ///
    /// # Errors
    ///
    /// - [`RunError::MissingDatasetVersion`] / [`RunError::MissingPayload`]
    ///   when either input is absent
    /// - [`RunError::InvalidDatasetVersion`] /
    ///   [`RunError::MalformedPayload`] / [`RunError::InvalidParameters`] for
    ///   unusable input
    /// - [`RunError::Integrity`], [`RunError::Evidence`] or
    ///   [`RunError::Audit`] if an emitted entity cannot be built or verified
    pub fn run(&self, request: &RunRequest) -> Result<RunReport, RunError> {
        let dataset_version_id = match request.dataset_version_id.as_deref().map(str::trim) {
            None | Some("") => return Err(RunError::MissingDatasetVersion),
            Some(raw) => DatasetVersionId::new(raw)
                .map_err(|source| RunError::InvalidDatasetVersion { source })?,
        };
        let dv = dataset_version_id.to_string();

        let payload = match &request.payload {
            None | Some(Value::Null) => {
                return Err(RunError::MissingPayload {
                    dataset_version_id: dv,
                });
            },
            Some(payload) => payload.clone(),
        };
        let raw = RawRecord::new(dataset_version_id.clone(), payload).map_err(|err| {
            RunError::MalformedPayload {
                dataset_version_id: dv.clone(),
                reason: err.to_string(),
            }
        })?;
        let record = E::Record::deserialize(raw.payload()).map_err(|err| {
            RunError::MalformedPayload {
                dataset_version_id: dv.clone(),
                reason: err.to_string(),
            }
        })?;

        let mut source_systems = self.engine.source_systems(&record);
        source_systems.sort();
        source_systems.dedup();

        let settings_digest = content_digest(&RunSettings {
            configuration: self.engine.config(),
            parameters: &request.parameters,
        })
        .map_err(|source| RunError::InvalidParameters {
            dataset_version_id: dv.clone(),
            source,
        })?;
        let result_set_id = generate_id(&dv, E::NAME, &[E::VERSION, settings_digest.as_str()]);
        let started_at = request
            .started_at
            .to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let run_id = generate_id(
            &dv,
            "run",
            &[E::NAME, started_at.as_str(), result_set_id.as_str()],
        );

        let ctx = RuleContext::new(
            dataset_version_id.clone(),
            source_systems.clone(),
            request.parameters.clone(),
        );
        let assessment = self.engine.rules().evaluate(&record, &ctx);
        raw.verify_seal().map_err(|source| RunError::Integrity {
            dataset_version_id: dv.clone(),
            source,
        })?;

        let mut assumptions = self.default_assumptions.clone();
        assumptions.extend(request.assumptions.clone());
        let assumptions = FrozenMap::from(assumptions);

        let emission = self
            .emitter
            .emit(&EmitRequest {
                dataset_version_id: &dataset_version_id,
                result_set_id: &result_set_id,
                assessment: &assessment,
                source_systems: &source_systems,
                assumptions: &assumptions,
            })
            .map_err(|source| RunError::Evidence {
                dataset_version_id: dv.clone(),
                source,
            })?;
        for finding in &emission.findings {
            finding.verify_seal().map_err(|source| RunError::Integrity {
                dataset_version_id: dv.clone(),
                source,
            })?;
        }

        let trail = self
            .audit(
                &dataset_version_id,
                &run_id,
                &source_systems,
                &assessment,
                (emission.findings.len(), emission.evidence.len()),
            )
            .map_err(|source| RunError::Audit {
                dataset_version_id: dv.clone(),
                source,
            })?;
        let risk_line = trail.warn_risks(
            E::NAME,
            &dataset_version_id,
            &source_systems,
            &assessment.risk_messages(),
        );
        let audit_summary = trail.summarize();

        let status = RunStatus::from_assessment(&assessment);
        info!(
            engine = E::NAME,
            dataset_version_id = %dataset_version_id,
            run_id = %run_id,
            status = %status,
            findings = emission.findings.len(),
            "assessment run complete"
        );

        let Assessment {
            results,
            rule_results,
            errors,
            warnings,
            is_valid,
        } = assessment;

        let mut report = RunReport {
            engine: E::NAME.to_string(),
            engine_version: E::VERSION.to_string(),
            run_id,
            result_set_id,
            dataset_version_id,
            started_at: request.started_at,
            status,
            is_valid,
            source_systems,
            results,
            rule_results,
            errors,
            warnings,
            findings: emission.findings,
            evidence: emission.evidence,
            audit_trail: trail.into_entries(),
            audit_summary,
            risk_line,
            seal: String::new(),
        };
        report.seal = report
            .compute_seal()
            .map_err(|source| RunError::Evidence {
                dataset_version_id: dv.clone(),
                source: source.into(),
            })?;
        Ok(report)
    }

    fn audit(
        &self,
        dataset_version_id: &DatasetVersionId,
        run_id: &DeterministicId,
        source_systems: &[String],
        assessment: &Assessment,
        (findings, evidence): (usize, usize),
    ) -> Result<AuditTrail, AuditError> {
        let count = |outcome: RuleOutcome| {
            assessment
                .results
                .iter()
                .filter(|r| r.outcome == outcome)
                .count()
        };

        let mut trail = AuditTrail::with_clock(Arc::clone(&self.clock));
        trail.record(
            AuditAction::Creation,
            dataset_version_id,
            source_systems,
            format!("{} {} run {run_id} created", E::NAME, E::VERSION),
        )?;
        trail.record(
            AuditAction::Validation,
            dataset_version_id,
            source_systems,
            format!(
                "{} rules evaluated: {} passed, {} failed, {} errored",
                assessment.results.len(),
                count(RuleOutcome::Passed),
                count(RuleOutcome::Failed),
                count(RuleOutcome::Errored),
            ),
        )?;
        trail.record(
            AuditAction::ForensicAnalysis,
            dataset_version_id,
            source_systems,
            format!("{findings} findings emitted"),
        )?;
        trail.record(
            AuditAction::Transaction,
            dataset_version_id,
            source_systems,
            format!("{findings} findings and {evidence} evidence records staged"),
        )?;
        debug!(run_id = %run_id, head = %trail.head(), "audit trail recorded");
        Ok(trail)
    }
}

impl<E: AssessmentEngine> EngineRunner for Orchestrator<E> {
    fn engine_name(&self) -> &'static str {
        E::NAME
    }

    fn engine_version(&self) -> &'static str {
        E::VERSION
    }

    fn rule_names(&self) -> Vec<String> {
        self.engine
            .rules()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn run(&self, request: &RunRequest) -> Result<RunReport, RunError> {
        Orchestrator::run(self, request)
    }
}
