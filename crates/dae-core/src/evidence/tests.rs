//! Tests for evidence and finding emission.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::*;
use crate::dataset::DatasetVersionId;
use crate::determinism::{DeterministicId, generate_id};
use crate::immutability::{FrozenMap, ImmutabilityViolation, Protected};
use crate::rules::{Assessment, RuleOutcome, RuleResult, Severity};

fn result(rule: &str, category: &str, outcome: RuleOutcome, severity: Severity) -> RuleResult {
    RuleResult {
        rule: rule.to_string(),
        category: category.to_string(),
        outcome,
        severity,
        message: format!("{rule} says {outcome:?}"),
        evidence: BTreeMap::from([("delta".to_string(), 0.25)]),
        inputs: BTreeMap::from([("collection".to_string(), json!("accounts"))]),
    }
}

fn dv() -> DatasetVersionId {
    DatasetVersionId::new("dv-evidence").unwrap()
}

fn result_set() -> DeterministicId {
    generate_id("dv-evidence", "migration_readiness", &["1.0.0"])
}

fn assumptions() -> FrozenMap {
    [("fx_source", json!("ecb"))].into_iter().collect()
}

fn emit(results: Vec<RuleResult>, sources: &[String]) -> Emission {
    let assessment = Assessment::from_results(results);
    let dv = dv();
    let rs = result_set();
    let assumptions = assumptions();
    FindingEmitter::new("migration_readiness", "1.0.0")
        .emit(&EmitRequest {
            dataset_version_id: &dv,
            result_set_id: &rs,
            assessment: &assessment,
            source_systems: sources,
            assumptions: &assumptions,
        })
        .unwrap()
}

fn sources() -> Vec<String> {
    vec!["erp".to_string(), "crm".to_string()]
}

// ============================================================
// Grouping
// ============================================================

#[test]
fn test_one_finding_per_category_severity() {
    let emission = emit(
        vec![
            result("dup_ids", "quality", RuleOutcome::Failed, Severity::Error),
            result("null_rate", "quality", RuleOutcome::Failed, Severity::Error),
            result("stale", "quality", RuleOutcome::Failed, Severity::Warning),
            result("required", "structural", RuleOutcome::Failed, Severity::Error),
            result("clean", "structural", RuleOutcome::Passed, Severity::Error),
            result("broken", "integrity", RuleOutcome::Errored, Severity::Error),
        ],
        &sources(),
    );

    let keys: Vec<(&str, Severity)> = emission
        .findings
        .iter()
        .map(|f| (f.category(), f.severity()))
        .collect();
    assert_eq!(
        keys,
        [
            ("quality", Severity::Error),
            ("quality", Severity::Warning),
            ("structural", Severity::Error),
        ]
    );
    assert_eq!(emission.evidence.len(), 3);

    let quality = &emission.findings[0];
    assert_eq!(quality.detail(), "dup_ids says Failed; null_rate says Failed");
    let evidence = &emission.evidence[&quality.evidence_ids()[0]];
    assert_eq!(evidence.rules().len(), 2);
    assert_eq!(evidence.check_type(), CHECK_TYPE_RULE_EVALUATION);
    assert_eq!(evidence.assumptions().get("fx_source"), Some(&json!("ecb")));
}

#[test]
fn test_clean_assessment_emits_nothing() {
    let emission = emit(
        vec![result("ok", "structural", RuleOutcome::Passed, Severity::Error)],
        &sources(),
    );
    assert!(emission.findings.is_empty());
    assert!(emission.evidence.is_empty());
}

#[test]
fn test_metadata_has_sorted_source_systems() {
    let emission = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &["erp".to_string(), "crm".to_string(), "erp".to_string()],
    );
    let finding = &emission.findings[0];
    assert_eq!(finding.source_systems(), ["crm", "erp"]);
    assert_eq!(finding.metadata().get("rules"), Some(&json!(["required"])));
    assert_eq!(
        finding.metadata().get("engine"),
        Some(&Value::from("migration_readiness"))
    );
}

// ============================================================
// Identity
// ============================================================

#[test]
fn test_finding_id_is_deterministic() {
    let first = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &sources(),
    );
    let second = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &sources(),
    );
    assert_eq!(first, second);
    assert_eq!(
        first.findings[0].id(),
        &Finding::derive_id(&dv(), "migration_readiness", "structural", Severity::Error)
    );
}

#[test]
fn test_registration_order_does_not_change_ids() {
    let a = result("a_rule", "quality", RuleOutcome::Failed, Severity::Error);
    let b = result("b_rule", "quality", RuleOutcome::Failed, Severity::Error);
    let forward = emit(vec![a.clone(), b.clone()], &sources());
    let reverse = emit(vec![b, a], &sources());
    assert_eq!(forward.findings, reverse.findings);
    assert_eq!(forward.evidence, reverse.evidence);
}

#[test]
fn test_content_change_keeps_finding_id_changes_evidence() {
    let mut changed = result("required", "structural", RuleOutcome::Failed, Severity::Error);
    changed.message = "different detail".to_string();
    let first = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &sources(),
    );
    let second = emit(vec![changed], &sources());

    assert_eq!(first.findings[0].id(), second.findings[0].id());
    assert_ne!(
        first.findings[0].content_digest(),
        second.findings[0].content_digest()
    );
    assert_ne!(
        first.findings[0].evidence_ids(),
        second.findings[0].evidence_ids()
    );
}

// ============================================================
// Integrity
// ============================================================

#[test]
fn test_emitted_records_verify() {
    let emission = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &sources(),
    );
    for evidence in emission.evidence.values() {
        evidence.verify().unwrap();
    }
    for finding in &emission.findings {
        finding.verify().unwrap();
    }
}

#[test]
fn test_writes_are_rejected() {
    let emission = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &sources(),
    );
    let mut finding = emission.findings[0].clone();
    for field in Finding::FIELDS {
        assert!(matches!(
            finding.try_set(field, json!("x")),
            Err(ImmutabilityViolation::FieldWrite { .. })
        ));
    }
    let mut evidence = emission.evidence.values().next().unwrap().clone();
    for field in Evidence::FIELDS {
        assert!(evidence.try_set(field, json!(null)).is_err());
    }
    assert_eq!(finding, emission.findings[0]);
}

#[test]
fn test_tampered_evidence_detected() {
    let emission = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &sources(),
    );
    let evidence = emission.evidence.values().next().unwrap();
    let mut json = serde_json::to_value(evidence).unwrap();
    json["rules"][0]["message"] = json!("nothing to see here");
    let tampered: Evidence = serde_json::from_value(json).unwrap();
    assert!(matches!(
        tampered.verify(),
        Err(EvidenceError::HashMismatch { kind: "evidence", .. })
    ));
}

#[test]
fn test_tampered_finding_metadata_detected() {
    let emission = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &sources(),
    );
    let mut json = serde_json::to_value(&emission.findings[0]).unwrap();
    json["metadata"]["source_systems"] = json!(["erp"]);
    let tampered: Finding = serde_json::from_value(json).unwrap();
    assert!(tampered.verify().is_err());
}

#[test]
fn test_finding_reserializes_identically() {
    let emission = emit(
        vec![result("required", "structural", RuleOutcome::Failed, Severity::Error)],
        &sources(),
    );
    let first = serde_json::to_string(&emission.findings[0]).unwrap();
    let back: Finding = serde_json::from_str(&first).unwrap();
    let second = serde_json::to_string(&back).unwrap();
    assert_eq!(first, second);
    back.verify().unwrap();
}
