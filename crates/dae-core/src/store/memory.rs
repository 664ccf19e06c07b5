//! In-memory store backend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{AssessmentStore, EvidenceRef, FindingRef, PersistenceError, UpsertStatus};
use crate::dataset::DatasetVersionId;
use crate::determinism::DeterministicId;
use crate::evidence::{Evidence, Finding};
use crate::immutability::Protected;
use crate::orchestrator::RunReport;

type ReportKey = (DatasetVersionId, DeterministicId);

#[derive(Debug, Default)]
struct Tables {
    evidence: HashMap<DeterministicId, Vec<u8>>,
    findings: HashMap<DeterministicId, Vec<u8>>,
    reports: HashMap<ReportKey, Vec<u8>>,
}

/// Store holding serialized entities in memory.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(value).map_err(|err| PersistenceError::Backend {
        message: err.to_string(),
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    serde_json::from_slice(bytes).map_err(|err| PersistenceError::Backend {
        message: err.to_string(),
    })
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored evidence records.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Backend`] if the lock is poisoned.
    pub fn evidence_count(&self) -> Result<usize, PersistenceError> {
        let tables = self.tables.read().map_err(|_| PersistenceError::poisoned())?;
        Ok(tables.evidence.len())
    }

    /// Number of stored findings.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Backend`] if the lock is poisoned.
    pub fn finding_count(&self) -> Result<usize, PersistenceError> {
        let tables = self.tables.read().map_err(|_| PersistenceError::poisoned())?;
        Ok(tables.findings.len())
    }

    /// Number of stored reports.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Backend`] if the lock is poisoned.
    pub fn report_count(&self) -> Result<usize, PersistenceError> {
        let tables = self.tables.read().map_err(|_| PersistenceError::poisoned())?;
        Ok(tables.reports.len())
    }

    /// Ids of stored findings, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Backend`] if the lock is poisoned.
    pub fn finding_ids(&self) -> Result<Vec<DeterministicId>, PersistenceError> {
        let tables = self.tables.read().map_err(|_| PersistenceError::poisoned())?;
        let mut ids: Vec<_> = tables.findings.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl AssessmentStore for MemoryStore {
    fn persist_evidence(&self, evidence: &Evidence) -> Result<EvidenceRef, PersistenceError> {
        evidence.verify()?;
        let bytes = encode(evidence)?;

        let mut tables = self.tables.write().map_err(|_| PersistenceError::poisoned())?;
        if let Some(existing) = tables.evidence.get(evidence.id()) {
            let existing: Evidence = decode(existing)?;
            if existing != *evidence {
                return Err(PersistenceError::Collision {
                    kind: "evidence",
                    id: evidence.id().to_string(),
                });
            }
            return Ok(EvidenceRef {
                id: evidence.id().clone(),
                status: UpsertStatus::Unchanged,
            });
        }
        tables.evidence.insert(evidence.id().clone(), bytes);
        debug!(evidence_id = %evidence.id(), "evidence stored");
        Ok(EvidenceRef {
            id: evidence.id().clone(),
            status: UpsertStatus::Inserted,
        })
    }

    fn persist_finding(&self, finding: &Finding) -> Result<FindingRef, PersistenceError> {
        finding.verify()?;
        let bytes = encode(finding)?;

        let mut tables = self.tables.write().map_err(|_| PersistenceError::poisoned())?;
        let status = match tables.findings.get(finding.id()) {
            None => UpsertStatus::Inserted,
            Some(existing) => {
                let existing: Finding = decode(existing)?;
                if existing.seal() == finding.seal() {
                    UpsertStatus::Unchanged
                } else {
                    if existing.content_digest() == finding.content_digest() {
                        debug!(finding_id = %finding.id(), "finding re-bound to new result set");
                    } else {
                        warn!(
                            finding_id = %finding.id(),
                            dataset_version_id = %finding.dataset_version_id(),
                            previous_digest = existing.content_digest(),
                            content_digest = finding.content_digest(),
                            "finding content changed under a stable id; replacing"
                        );
                    }
                    UpsertStatus::Replaced
                }
            },
        };
        if status != UpsertStatus::Unchanged {
            tables.findings.insert(finding.id().clone(), bytes);
        }
        Ok(FindingRef {
            id: finding.id().clone(),
            content_digest: finding.content_digest().to_string(),
            status,
        })
    }

    fn persist_report(&self, report: &RunReport) -> Result<UpsertStatus, PersistenceError> {
        report.verify()?;
        let bytes = encode(report)?;
        let key = (report.dataset_version_id.clone(), report.run_id.clone());

        let mut tables = self.tables.write().map_err(|_| PersistenceError::poisoned())?;
        let status = match tables.reports.get(&key) {
            None => UpsertStatus::Inserted,
            Some(existing) if *existing == bytes => UpsertStatus::Unchanged,
            Some(_) => UpsertStatus::Replaced,
        };
        tables.reports.insert(key, bytes);
        Ok(status)
    }

    fn load_evidence(&self, id: &DeterministicId) -> Result<Evidence, PersistenceError> {
        let tables = self.tables.read().map_err(|_| PersistenceError::poisoned())?;
        let bytes = tables
            .evidence
            .get(id)
            .ok_or_else(|| PersistenceError::NotFound {
                kind: "evidence",
                id: id.to_string(),
            })?;
        let evidence: Evidence = decode(bytes)?;
        evidence.verify()?;
        if evidence.id() != id {
            return Err(PersistenceError::Collision {
                kind: "evidence",
                id: id.to_string(),
            });
        }
        Ok(evidence)
    }

    fn load_finding(&self, id: &DeterministicId) -> Result<Finding, PersistenceError> {
        let tables = self.tables.read().map_err(|_| PersistenceError::poisoned())?;
        let bytes = tables
            .findings
            .get(id)
            .ok_or_else(|| PersistenceError::NotFound {
                kind: "finding",
                id: id.to_string(),
            })?;
        let finding: Finding = decode(bytes)?;
        finding.verify()?;
        Ok(finding)
    }

    fn load_report(
        &self,
        dataset_version_id: &DatasetVersionId,
        run_id: &DeterministicId,
    ) -> Result<RunReport, PersistenceError> {
        let tables = self.tables.read().map_err(|_| PersistenceError::poisoned())?;
        let key = (dataset_version_id.clone(), run_id.clone());
        let bytes = tables
            .reports
            .get(&key)
            .ok_or_else(|| PersistenceError::NotFound {
                kind: "report",
                id: format!("{dataset_version_id}/{run_id}"),
            })?;
        let report: RunReport = decode(bytes)?;
        report.verify()?;
        Ok(report)
    }
}

#[cfg(test)]
mod unit_tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::determinism::generate_id;
    use crate::immutability::FrozenMap;
    use crate::rules::{RuleOutcome, RuleResult, Severity};

    fn dv() -> DatasetVersionId {
        DatasetVersionId::new("dv-store").unwrap()
    }

    fn result(rule: &str, message: &str) -> RuleResult {
        RuleResult {
            rule: rule.to_string(),
            category: "integrity".to_string(),
            outcome: RuleOutcome::Failed,
            severity: Severity::Error,
            message: message.to_string(),
            evidence: BTreeMap::new(),
            inputs: BTreeMap::new(),
        }
    }

    fn evidence(message: &str) -> Evidence {
        Evidence::new(
            dv(),
            generate_id("dv-store", "test", &["v1"]),
            "test_engine",
            "integrity",
            Severity::Error,
            "rule_evaluation",
            vec![result("refs", message)],
            FrozenMap::empty(),
        )
        .unwrap()
    }

    fn finding(detail: &str, evidence: &Evidence) -> Finding {
        Finding::new(
            dv(),
            generate_id("dv-store", "test", &["v1"]),
            "test_engine",
            "integrity",
            Severity::Error,
            detail.to_string(),
            FrozenMap::empty(),
            vec![evidence.id().clone()],
        )
        .unwrap()
    }

    #[test]
    fn test_evidence_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let record = evidence("3 unresolved references");

        let first = store.persist_evidence(&record).unwrap();
        let second = store.persist_evidence(&record).unwrap();
        assert_eq!(first.status, UpsertStatus::Inserted);
        assert_eq!(second.status, UpsertStatus::Unchanged);
        assert_eq!(first.id, second.id);
        assert_eq!(store.evidence_count().unwrap(), 1);
        assert_eq!(store.load_evidence(record.id()).unwrap(), record);
    }

    #[test]
    fn test_finding_content_change_replaces() {
        let store = MemoryStore::new();
        let old_evidence = evidence("3 unresolved references");
        let new_evidence = evidence("4 unresolved references");
        let old = finding("3 unresolved references", &old_evidence);
        let new = finding("4 unresolved references", &new_evidence);
        assert_eq!(old.id(), new.id());

        assert_eq!(
            store.persist_finding(&old).unwrap().status,
            UpsertStatus::Inserted
        );
        assert_eq!(
            store.persist_finding(&old).unwrap().status,
            UpsertStatus::Unchanged
        );
        let replaced = store.persist_finding(&new).unwrap();
        assert_eq!(replaced.status, UpsertStatus::Replaced);
        assert_eq!(replaced.content_digest, new.content_digest());
        assert_eq!(store.finding_count().unwrap(), 1);
        assert_eq!(store.load_finding(new.id()).unwrap(), new);
    }

    #[test]
    fn test_different_bytes_under_evidence_id_collide() {
        let store = MemoryStore::new();
        let record = evidence("3 unresolved references");
        store.persist_evidence(&record).unwrap();

        {
            let mut tables = store.tables.write().unwrap();
            let mut value: serde_json::Value =
                serde_json::from_slice(&tables.evidence[record.id()]).unwrap();
            value["rules"][0]["message"] = json!("2 unresolved references");
            tables
                .evidence
                .insert(record.id().clone(), serde_json::to_vec(&value).unwrap());
        }

        let err = store.persist_evidence(&record).unwrap_err();
        assert!(
            matches!(
                &err,
                PersistenceError::Collision { kind: "evidence", id } if id == record.id().as_str()
            ),
            "{err:?}"
        );
        assert_eq!(store.evidence_count().unwrap(), 1);
    }

    #[test]
    fn test_clones_share_tables() {
        let store = MemoryStore::new();
        let clone = store.clone();
        let record = evidence("shared");
        store.persist_evidence(&record).unwrap();
        assert_eq!(clone.load_evidence(record.id()).unwrap(), record);
    }

    #[test]
    fn test_missing_entities_not_found() {
        let store = MemoryStore::new();
        let id = generate_id("dv-store", "nothing", &["here"]);
        assert!(matches!(
            store.load_evidence(&id),
            Err(PersistenceError::NotFound { kind: "evidence", .. })
        ));
        assert!(matches!(
            store.load_finding(&id),
            Err(PersistenceError::NotFound { kind: "finding", .. })
        ));
        assert!(matches!(
            store.load_report(&dv(), &id),
            Err(PersistenceError::NotFound { kind: "report", .. })
        ));
    }

    #[test]
    fn test_tampered_bytes_detected_on_read() {
        let store = MemoryStore::new();
        let record = evidence("3 unresolved references");
        let stored = finding("3 unresolved references", &record);
        store.persist_evidence(&record).unwrap();
        store.persist_finding(&stored).unwrap();

        {
            let mut tables = store.tables.write().unwrap();
            let mut value: serde_json::Value =
                serde_json::from_slice(&tables.evidence[record.id()]).unwrap();
            value["rules"][0]["message"] = json!("0 unresolved references");
            tables
                .evidence
                .insert(record.id().clone(), serde_json::to_vec(&value).unwrap());

            let mut value: serde_json::Value =
                serde_json::from_slice(&tables.findings[stored.id()]).unwrap();
            value["detail"] = json!("all clear");
            tables
                .findings
                .insert(stored.id().clone(), serde_json::to_vec(&value).unwrap());
        }

        assert!(matches!(
            store.load_evidence(record.id()),
            Err(PersistenceError::Corrupt(_))
        ));
        assert!(matches!(
            store.load_finding(stored.id()),
            Err(PersistenceError::Corrupt(_))
        ));
    }
}
