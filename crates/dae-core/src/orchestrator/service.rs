//! Binds an engine to the persistence collaborator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use super::error::RunError;
use super::report::{RunReport, RunRequest};
use super::run::EngineRunner;
use crate::dataset::{DatasetSource, DatasetVersionId};
use crate::determinism::DeterministicId;
use crate::store::{AssessmentStore, PersistenceError, UpsertStatus};

/// Runs an engine and persists what it produced.
pub struct EngineService<S> {
    runner: Arc<dyn EngineRunner>,
    store: S,
}

impl<S> fmt::Debug for EngineService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineService")
            .field("engine", &self.runner.engine_name())
            .finish_non_exhaustive()
    }
}

impl<S: AssessmentStore> EngineService<S> {
    /// Creates a service over a runner and a store.
    #[must_use]
    pub fn new(runner: Arc<dyn EngineRunner>, store: S) -> Self {
        Self { runner, store }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Runs an assessment and upserts evidence, then findings, then the
    /// report.
    ///
    /// Retrying after a persistence failure is safe: every write is keyed by
    /// a deterministic id.
    ///
    /// # Errors
    ///
    /// Any [`RunError`] from the run, or [`RunError::Persistence`] if the
    /// store rejects a write.
    pub fn run(&self, request: &RunRequest) -> Result<RunReport, RunError> {
        let report = self.runner.run(request)?;
        let persistence = |source: PersistenceError| RunError::Persistence {
            dataset_version_id: report.dataset_version_id.to_string(),
            source,
        };

        for evidence in report.evidence.values() {
            self.store.persist_evidence(evidence).map_err(persistence)?;
        }
        let mut replaced = 0usize;
        for finding in &report.findings {
            let receipt = self.store.persist_finding(finding).map_err(persistence)?;
            if receipt.status == UpsertStatus::Replaced {
                replaced += 1;
            }
        }
        self.store.persist_report(&report).map_err(persistence)?;

        info!(
            engine = self.runner.engine_name(),
            dataset_version_id = %report.dataset_version_id,
            run_id = %report.run_id,
            evidence = report.evidence.len(),
            findings = report.findings.len(),
            replaced,
            "run persisted"
        );
        Ok(report)
    }

    /// Runs over a snapshot resolved through the ingestion collaborator.
    ///
    /// # Errors
    ///
    /// [`RunError::Dataset`] if the snapshot cannot be loaded, otherwise as
    /// [`EngineService::run`].
    pub fn run_snapshot(
        &self,
        source: &dyn DatasetSource,
        dataset_version_id: &DatasetVersionId,
        started_at: DateTime<Utc>,
        parameters: BTreeMap<String, Value>,
        assumptions: BTreeMap<String, Value>,
    ) -> Result<RunReport, RunError> {
        let (version, record) = source
            .load_dataset_version(dataset_version_id)
            .map_err(|source| RunError::Dataset {
                dataset_version_id: dataset_version_id.to_string(),
                source,
            })?;
        let request = RunRequest {
            dataset_version_id: Some(version.id().to_string()),
            payload: Some(record.payload().clone()),
            started_at,
            parameters,
            assumptions,
        };
        self.run(&request)
    }

    /// Retrieves a persisted report.
    ///
    /// # Errors
    ///
    /// [`RunError::Persistence`] if the report is missing or fails
    /// verification.
    pub fn report(
        &self,
        dataset_version_id: &DatasetVersionId,
        run_id: &DeterministicId,
    ) -> Result<RunReport, RunError> {
        self.store
            .load_report(dataset_version_id, run_id)
            .map_err(|source| RunError::Persistence {
                dataset_version_id: dataset_version_id.to_string(),
                source,
            })
    }
}
