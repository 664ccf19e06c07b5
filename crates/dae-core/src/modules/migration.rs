//! Data-migration readiness.
//!
//! Assesses a staged extract before it is loaded into a target system:
//!
//! | Category           | Rule                           | Severity |
//! |--------------------|--------------------------------|----------|
//! | `structural`       | required collections present   | error    |
//! | `quality`          | `source_record_id` unique      | error    |
//! | `mapping_coverage` | enough collections populated   | error    |
//! | `integrity`        | declared references resolve    | error    |

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ConfigError, check_fraction, check_non_empty};
use crate::orchestrator::AssessmentEngine;
use crate::rules::{Rule, RuleContext, RuleEvaluationError, RuleSet, RuleSetError, Verdict};

/// Engine name.
pub const ENGINE_NAME: &str = "migration_readiness";

/// Field every migrated record is keyed by.
pub const RECORD_KEY: &str = "source_record_id";

/// A staged extract from one source system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationDataset {
    /// System the extract came from.
    pub source_system: String,
    /// Collection name to records.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<Map<String, Value>>>,
}

impl MigrationDataset {
    fn populated(&self, name: &str) -> bool {
        self.collections.get(name).is_some_and(|c| !c.is_empty())
    }
}

/// A foreign key from one collection into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceSpec {
    /// Referencing collection.
    pub collection: String,
    /// Field holding the referenced `source_record_id`.
    pub field: String,
    /// Referenced collection.
    pub target: String,
}

impl ReferenceSpec {
    fn label(&self) -> String {
        format!("{}.{} -> {}", self.collection, self.field, self.target)
    }
}

/// `[engines.migration_readiness]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationReadinessConfig {
    /// Kill switch.
    pub enabled: bool,
    /// Collections the target system cannot load without.
    pub required_collections: Vec<String>,
    /// Minimum fraction of required collections present and non-empty.
    pub min_mapping_coverage: f64,
    /// References that must resolve.
    pub references: Vec<ReferenceSpec>,
}

impl MigrationReadinessConfig {
    /// Checks parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on an empty collection list or a
    /// coverage threshold outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_empty(ENGINE_NAME, "required_collections", &self.required_collections)?;
        check_fraction(ENGINE_NAME, "min_mapping_coverage", self.min_mapping_coverage, true)
    }
}

/// The migration readiness engine.
#[derive(Debug)]
pub struct MigrationReadiness {
    config: MigrationReadinessConfig,
    rules: RuleSet<MigrationDataset>,
}

impl MigrationReadiness {
    /// Builds the rule set from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError`] if two rules share a name.
    pub fn new(config: &MigrationReadinessConfig) -> Result<Self, RuleSetError> {
        let required = config.required_collections.clone();
        let rules: Vec<Box<dyn Rule<MigrationDataset>>> = vec![
            Box::new(RequiredCollections {
                required: required.clone(),
            }),
            Box::new(UniqueRecordIds),
            Box::new(MappingCoverage {
                required,
                threshold: config.min_mapping_coverage,
            }),
            Box::new(ReferencesResolve {
                references: config.references.clone(),
            }),
        ];
        Ok(Self {
            config: config.clone(),
            rules: RuleSet::from_rules(rules)?,
        })
    }
}

impl AssessmentEngine for MigrationReadiness {
    const NAME: &'static str = ENGINE_NAME;
    const VERSION: &'static str = "1.0.0";

    type Record = MigrationDataset;
    type Config = MigrationReadinessConfig;

    fn config(&self) -> &MigrationReadinessConfig {
        &self.config
    }

    fn rules(&self) -> &RuleSet<MigrationDataset> {
        &self.rules
    }

    fn source_systems(&self, record: &MigrationDataset) -> Vec<String> {
        vec![record.source_system.clone()]
    }
}

fn record_key(record: &Map<String, Value>, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> f64 {
    n as f64
}

struct RequiredCollections {
    required: Vec<String>,
}

impl Rule<MigrationDataset> for RequiredCollections {
    fn name(&self) -> &str {
        "required_collections_present"
    }

    fn category(&self) -> &str {
        "structural"
    }

    fn evaluate(
        &self,
        record: &MigrationDataset,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|name| !record.collections.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        let verdict = if missing.is_empty() {
            Verdict::pass("all required collections present")
        } else {
            Verdict::fail(format!("missing required collections: {}", missing.join(", ")))
        };
        Ok(verdict
            .with_evidence("missing_collections", count(missing.len()))
            .with_input("required_collections", self.required.clone()))
    }
}

struct UniqueRecordIds;

impl Rule<MigrationDataset> for UniqueRecordIds {
    fn name(&self) -> &str {
        "unique_source_record_ids"
    }

    fn category(&self) -> &str {
        "quality"
    }

    fn evaluate(
        &self,
        record: &MigrationDataset,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let mut duplicates: BTreeSet<String> = BTreeSet::new();
        let mut duplicate_records = 0usize;
        for (name, records) in &record.collections {
            let mut seen = BTreeSet::new();
            for key in records.iter().filter_map(|r| record_key(r, RECORD_KEY)) {
                if !seen.insert(key.clone()) {
                    duplicate_records += 1;
                    duplicates.insert(format!("{name}/{key}"));
                }
            }
        }
        let verdict = if duplicates.is_empty() {
            Verdict::pass("source_record_id values are unique")
        } else {
            Verdict::fail(format!(
                "duplicate {RECORD_KEY} values: {}",
                duplicates.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            ))
        };
        Ok(verdict
            .with_evidence("duplicate_records", count(duplicate_records))
            .with_input("duplicates", duplicates.into_iter().collect::<Vec<_>>()))
    }
}

struct MappingCoverage {
    required: Vec<String>,
    threshold: f64,
}

impl Rule<MigrationDataset> for MappingCoverage {
    fn name(&self) -> &str {
        "mapping_coverage"
    }

    fn category(&self) -> &str {
        "mapping_coverage"
    }

    fn evaluate(
        &self,
        record: &MigrationDataset,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        if self.required.is_empty() {
            return Err(RuleEvaluationError::missing_parameter("required_collections"));
        }
        let covered = self
            .required
            .iter()
            .filter(|name| record.populated(name))
            .count();
        let coverage = count(covered) / count(self.required.len());
        let verdict = if coverage >= self.threshold {
            Verdict::pass(format!("mapping coverage {:.1}%", coverage * 100.0))
        } else {
            Verdict::fail(format!(
                "mapping coverage {:.1}% below required {:.1}%",
                coverage * 100.0,
                self.threshold * 100.0
            ))
        };
        Ok(verdict
            .with_evidence("coverage", coverage)
            .with_evidence("threshold", self.threshold)
            .with_evidence("covered_collections", count(covered)))
    }
}

struct ReferencesResolve {
    references: Vec<ReferenceSpec>,
}

impl Rule<MigrationDataset> for ReferencesResolve {
    fn name(&self) -> &str {
        "references_resolve"
    }

    fn category(&self) -> &str {
        "integrity"
    }

    fn evaluate(
        &self,
        record: &MigrationDataset,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let mut checked = 0usize;
        let mut unresolved: BTreeMap<String, usize> = BTreeMap::new();
        for reference in &self.references {
            let Some(records) = record.collections.get(&reference.collection) else {
                continue;
            };
            let targets: BTreeSet<String> = record
                .collections
                .get(&reference.target)
                .map(|targets| {
                    targets
                        .iter()
                        .filter_map(|r| record_key(r, RECORD_KEY))
                        .collect()
                })
                .unwrap_or_default();
            for key in records.iter().filter_map(|r| record_key(r, &reference.field)) {
                checked += 1;
                if !targets.contains(&key) {
                    *unresolved.entry(reference.label()).or_insert(0) += 1;
                }
            }
        }

        let total: usize = unresolved.values().sum();
        let verdict = if total == 0 {
            Verdict::pass(format!("{checked} references resolve"))
        } else {
            let detail = unresolved
                .iter()
                .map(|(label, n)| format!("{label} ({n})"))
                .collect::<Vec<_>>()
                .join(", ");
            Verdict::fail(format!("{total} unresolved references: {detail}"))
        };
        Ok(verdict
            .with_evidence("checked_references", count(checked))
            .with_evidence("unresolved_references", count(total)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dataset::DatasetVersionId;
    use crate::rules::RuleOutcome;

    fn config() -> MigrationReadinessConfig {
        MigrationReadinessConfig {
            enabled: true,
            required_collections: vec!["accounts".to_string(), "contacts".to_string()],
            min_mapping_coverage: 0.9,
            references: vec![ReferenceSpec {
                collection: "contacts".to_string(),
                field: "account_id".to_string(),
                target: "accounts".to_string(),
            }],
        }
    }

    fn ctx() -> RuleContext {
        RuleContext::new(
            DatasetVersionId::new("dv-test").unwrap(),
            vec!["erp".to_string()],
            BTreeMap::new(),
        )
    }

    fn dataset(payload: Value) -> MigrationDataset {
        serde_json::from_value(payload).unwrap()
    }

    #[test]
    fn test_clean_extract_passes() {
        let engine = MigrationReadiness::new(&config()).unwrap();
        let record = dataset(json!({
            "source_system": "erp",
            "collections": {
                "accounts": [{"source_record_id": "a-1"}, {"source_record_id": 2}],
                "contacts": [
                    {"source_record_id": "c-1", "account_id": "a-1"},
                    {"source_record_id": "c-2", "account_id": 2},
                    {"source_record_id": "c-3"}
                ]
            }
        }));
        let assessment = engine.rules().evaluate(&record, &ctx());
        assert!(assessment.is_valid, "{:?}", assessment.errors);
        assert!(assessment.warnings.is_empty());
        assert_eq!(assessment.results[3].evidence["checked_references"], 2.0);
    }

    #[test]
    fn test_missing_collection_and_duplicates_fail_four_categories() {
        let engine = MigrationReadiness::new(&config()).unwrap();
        let record = dataset(json!({
            "source_system": "erp",
            "collections": {
                "contacts": [
                    {"source_record_id": "c-1", "account_id": "a-1"},
                    {"source_record_id": "c-1", "account_id": "a-2"}
                ]
            }
        }));
        let assessment = engine.rules().evaluate(&record, &ctx());
        assert!(!assessment.is_valid);

        let categories: BTreeSet<&str> = assessment
            .errors
            .iter()
            .map(|m| m.category.as_str())
            .collect();
        assert_eq!(
            categories.into_iter().collect::<Vec<_>>(),
            ["integrity", "mapping_coverage", "quality", "structural"]
        );
        assert_eq!(
            assessment.errors[0].message,
            "missing required collections: accounts"
        );
        assert_eq!(
            assessment.errors[1].message,
            "duplicate source_record_id values: contacts/c-1"
        );
        assert_eq!(
            assessment.errors[2].message,
            "mapping coverage 50.0% below required 90.0%"
        );
        assert_eq!(
            assessment.errors[3].message,
            "2 unresolved references: contacts.account_id -> accounts (2)"
        );
    }

    #[test]
    fn test_empty_collection_counts_against_coverage() {
        let engine = MigrationReadiness::new(&config()).unwrap();
        let record = dataset(json!({
            "source_system": "erp",
            "collections": {"accounts": [], "contacts": [{"source_record_id": "c-1"}]}
        }));
        let assessment = engine.rules().evaluate(&record, &ctx());
        assert_eq!(
            assessment.rule_results["required_collections_present"],
            RuleOutcome::Passed
        );
        assert_eq!(assessment.rule_results["mapping_coverage"], RuleOutcome::Failed);
    }

    #[test]
    fn test_duplicates_are_per_collection() {
        let engine = MigrationReadiness::new(&config()).unwrap();
        let record = dataset(json!({
            "source_system": "erp",
            "collections": {
                "accounts": [{"source_record_id": "x-1"}],
                "contacts": [{"source_record_id": "x-1"}]
            }
        }));
        let assessment = engine.rules().evaluate(&record, &ctx());
        assert_eq!(
            assessment.rule_results["unique_source_record_ids"],
            RuleOutcome::Passed
        );
    }

    #[test]
    fn test_config_validation() {
        let mut bad = config();
        bad.min_mapping_coverage = 0.0;
        assert!(bad.validate().is_err());
        bad.min_mapping_coverage = 1.0;
        assert!(bad.validate().is_ok());
        bad.required_collections.clear();
        assert!(bad.validate().is_err());
    }
}
