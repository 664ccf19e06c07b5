//! Rule registration and evaluation.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::result::{
    RuleEvaluationError, RuleMessage, RuleOutcome, RuleResult, Severity, Verdict,
};
use crate::dataset::DatasetVersionId;

/// A pure validation or risk check over records of type `R`.
pub trait Rule<R>: Send + Sync {
    /// Name, unique within a rule set.
    fn name(&self) -> &str;

    /// Risk category failures are reported under.
    fn category(&self) -> &str;

    /// Severity of a failing verdict.
    fn severity(&self) -> Severity {
        Severity::Error
    }

    /// Evaluates the record.
    ///
    /// # Errors
    ///
    /// Returns [`RuleEvaluationError`] when the rule cannot reach a verdict.
    /// A check that simply does not hold must return a failing [`Verdict`]
    /// instead.
    fn evaluate(&self, record: &R, ctx: &RuleContext) -> Result<Verdict, RuleEvaluationError>;
}

/// Read-only evaluation context shared by every rule in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleContext {
    dataset_version_id: DatasetVersionId,
    source_systems: Vec<String>,
    parameters: BTreeMap<String, Value>,
}

impl RuleContext {
    /// Creates a context. Source systems are sorted and deduplicated.
    #[must_use]
    pub fn new(
        dataset_version_id: DatasetVersionId,
        source_systems: impl IntoIterator<Item = String>,
        parameters: BTreeMap<String, Value>,
    ) -> Self {
        let source_systems: BTreeSet<String> = source_systems.into_iter().collect();
        Self {
            dataset_version_id,
            source_systems: source_systems.into_iter().collect(),
            parameters,
        }
    }

    /// The dataset version under evaluation.
    #[must_use]
    pub const fn dataset_version_id(&self) -> &DatasetVersionId {
        &self.dataset_version_id
    }

    /// Sorted, deduplicated source systems.
    #[must_use]
    pub fn source_systems(&self) -> &[String] {
        &self.source_systems
    }

    /// Caller-supplied run parameters.
    #[must_use]
    pub const fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    /// Looks up a required parameter.
    ///
    /// # Errors
    ///
    /// Returns [`RuleEvaluationError::MissingParameter`] if absent.
    pub fn parameter(&self, name: &str) -> Result<&Value, RuleEvaluationError> {
        self.parameters
            .get(name)
            .ok_or_else(|| RuleEvaluationError::missing_parameter(name))
    }
}

/// Errors raised while assembling a rule set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleSetError {
    /// Two rules share a name.
    #[error("duplicate rule name: {name}")]
    DuplicateRule {
        /// The repeated name.
        name: String,
    },
}

/// Ordered collection of independent rules.
pub struct RuleSet<R> {
    rules: Vec<Box<dyn Rule<R>>>,
}

impl<R> Default for RuleSet<R> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<R> std::fmt::Debug for RuleSet<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.names())
            .finish()
    }
}

impl<R> RuleSet<R> {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a rule set from rules in presentation order.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError::DuplicateRule`] if two rules share a name.
    pub fn from_rules(rules: Vec<Box<dyn Rule<R>>>) -> Result<Self, RuleSetError> {
        let mut set = Self::new();
        for rule in rules {
            set.register(rule)?;
        }
        Ok(set)
    }

    /// Appends a rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError::DuplicateRule`] if the name is taken.
    pub fn register(&mut self, rule: Box<dyn Rule<R>>) -> Result<(), RuleSetError> {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            return Err(RuleSetError::DuplicateRule {
                name: rule.name().to_string(),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns whether no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluates every rule against the record.
    ///
    /// Never short-circuits: a rule that returns an error or panics is
    /// recorded as [`RuleOutcome::Errored`] and the remaining rules still run.
    pub fn evaluate(&self, record: &R, ctx: &RuleContext) -> Assessment {
        let results = self
            .rules
            .iter()
            .map(|rule| evaluate_one(rule.as_ref(), record, ctx))
            .collect();
        Assessment::from_results(results)
    }
}

fn evaluate_one<R>(rule: &dyn Rule<R>, record: &R, ctx: &RuleContext) -> RuleResult {
    let attempt = catch_unwind(AssertUnwindSafe(|| rule.evaluate(record, ctx)))
        .unwrap_or_else(|payload| {
            let detail = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(RuleEvaluationError::Panicked { detail })
        })
        .and_then(|verdict| {
            let (passed, message, evidence, inputs) = verdict.into_parts();
            if let Some((key, _)) = evidence.iter().find(|(_, v)| !v.is_finite()) {
                return Err(RuleEvaluationError::NonFiniteEvidence { key: key.clone() });
            }
            Ok((passed, message, evidence, inputs))
        });

    let (outcome, message, evidence, inputs) = match attempt {
        Ok((true, message, evidence, inputs)) => (RuleOutcome::Passed, message, evidence, inputs),
        Ok((false, message, evidence, inputs)) => {
            (RuleOutcome::Failed, message, evidence, inputs)
        },
        Err(err) => {
            warn!(
                dataset_version_id = %ctx.dataset_version_id(),
                rule = rule.name(),
                error = %err,
                "rule evaluation error downgraded to errored result"
            );
            (
                RuleOutcome::Errored,
                format!("{} raised: {err}", rule.name()),
                BTreeMap::new(),
                BTreeMap::new(),
            )
        },
    };

    debug!(
        dataset_version_id = %ctx.dataset_version_id(),
        rule = rule.name(),
        outcome = ?outcome,
        "rule evaluated"
    );

    RuleResult {
        rule: rule.name().to_string(),
        category: rule.category().to_string(),
        outcome,
        severity: rule.severity(),
        message,
        evidence,
        inputs,
    }
}

/// Classified outcome of running a rule set over one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Every result, in registration order.
    pub results: Vec<RuleResult>,
    /// Rule name to outcome.
    pub rule_results: BTreeMap<String, RuleOutcome>,
    /// Hard failures and errored rules, in registration order.
    pub errors: Vec<RuleMessage>,
    /// Soft failures, in registration order.
    pub warnings: Vec<RuleMessage>,
    /// `true` iff there are no hard failures and no errored rules.
    pub is_valid: bool,
}

impl Assessment {
    /// Classifies a list of results.
    #[must_use]
    pub fn from_results(results: Vec<RuleResult>) -> Self {
        let mut rule_results = BTreeMap::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for result in &results {
            rule_results.insert(result.rule.clone(), result.outcome);
            match (result.outcome, result.severity) {
                (RuleOutcome::Passed, _) => {},
                (RuleOutcome::Errored, _) | (RuleOutcome::Failed, Severity::Error) => {
                    errors.push(result.to_message());
                },
                (RuleOutcome::Failed, Severity::Warning) => warnings.push(result.to_message()),
            }
        }

        let is_valid = errors.is_empty();
        Self {
            results,
            rule_results,
            errors,
            warnings,
            is_valid,
        }
    }

    /// Results whose rules ran and failed.
    pub fn failures(&self) -> impl Iterator<Item = &RuleResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Whether any rule broke during evaluation.
    #[must_use]
    pub fn has_errored_rules(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.outcome == RuleOutcome::Errored)
    }

    /// Messages of every failing result, in registration order.
    #[must_use]
    pub fn risk_messages(&self) -> Vec<String> {
        self.failures().map(|r| r.message.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Threshold {
        name: &'static str,
        limit: i64,
        severity: Severity,
    }

    impl Rule<i64> for Threshold {
        fn name(&self) -> &str {
            self.name
        }

        fn category(&self) -> &str {
            "bounds"
        }

        fn severity(&self) -> Severity {
            self.severity
        }

        fn evaluate(&self, record: &i64, _ctx: &RuleContext) -> Result<Verdict, RuleEvaluationError> {
            Ok(Verdict::new(
                *record <= self.limit,
                format!("{} limit {}", self.name, self.limit),
            )
            .with_evidence("value", *record as f64))
        }
    }

    struct Panics;

    impl Rule<i64> for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn category(&self) -> &str {
            "broken"
        }

        fn evaluate(&self, _record: &i64, _ctx: &RuleContext) -> Result<Verdict, RuleEvaluationError> {
            panic!("boom");
        }
    }

    struct Refuses;

    impl Rule<i64> for Refuses {
        fn name(&self) -> &str {
            "refuses"
        }

        fn category(&self) -> &str {
            "broken"
        }

        fn evaluate(&self, _record: &i64, ctx: &RuleContext) -> Result<Verdict, RuleEvaluationError> {
            ctx.parameter("limit")?;
            Ok(Verdict::pass("unreachable"))
        }
    }

    struct NotANumber;

    impl Rule<i64> for NotANumber {
        fn name(&self) -> &str {
            "nan"
        }

        fn category(&self) -> &str {
            "broken"
        }

        fn evaluate(&self, _record: &i64, _ctx: &RuleContext) -> Result<Verdict, RuleEvaluationError> {
            Ok(Verdict::pass("ok").with_evidence("ratio", f64::NAN))
        }
    }

    fn ctx() -> RuleContext {
        RuleContext::new(
            DatasetVersionId::new("dv-rules").unwrap(),
            vec!["erp".to_string(), "crm".to_string(), "erp".to_string()],
            BTreeMap::new(),
        )
    }

    fn threshold(name: &'static str, limit: i64, severity: Severity) -> Box<dyn Rule<i64>> {
        Box::new(Threshold {
            name,
            limit,
            severity,
        })
    }

    #[test]
    fn test_context_sorts_source_systems() {
        assert_eq!(ctx().source_systems(), ["crm", "erp"]);
    }

    #[test]
    fn test_classification() {
        let set = RuleSet::from_rules(vec![
            threshold("hard", 5, Severity::Error),
            threshold("soft", 5, Severity::Warning),
            threshold("loose", 100, Severity::Error),
        ])
        .unwrap();

        let assessment = set.evaluate(&10, &ctx());
        assert!(!assessment.is_valid);
        assert_eq!(assessment.errors.len(), 1);
        assert_eq!(assessment.errors[0].rule, "hard");
        assert_eq!(assessment.warnings.len(), 1);
        assert_eq!(assessment.rule_results["loose"], RuleOutcome::Passed);
        assert_eq!(assessment.results[0].evidence["value"], 10.0);
    }

    #[test]
    fn test_warnings_only_is_valid() {
        let set = RuleSet::from_rules(vec![threshold("soft", 5, Severity::Warning)]).unwrap();
        let assessment = set.evaluate(&10, &ctx());
        assert!(assessment.is_valid);
        assert_eq!(assessment.risk_messages(), ["soft limit 5"]);
    }

    #[test]
    fn test_broken_rules_do_not_abort() {
        let set = RuleSet::from_rules(vec![
            Box::new(Panics) as Box<dyn Rule<i64>>,
            Box::new(Refuses),
            Box::new(NotANumber),
            threshold("after", 100, Severity::Error),
        ])
        .unwrap();

        let assessment = set.evaluate(&1, &ctx());
        assert_eq!(assessment.rule_results["panics"], RuleOutcome::Errored);
        assert_eq!(assessment.rule_results["refuses"], RuleOutcome::Errored);
        assert_eq!(assessment.rule_results["nan"], RuleOutcome::Errored);
        assert_eq!(assessment.rule_results["after"], RuleOutcome::Passed);
        assert!(assessment.results[0].message.contains("boom"));
        assert!(assessment.results[1].message.contains("missing parameter: limit"));
        assert!(assessment.has_errored_rules());
        assert!(!assessment.is_valid);
        assert_eq!(assessment.failures().count(), 0);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = RuleSet::from_rules(vec![
            threshold("same", 1, Severity::Error),
            threshold("same", 2, Severity::Error),
        ]);
        assert_eq!(
            result.unwrap_err(),
            RuleSetError::DuplicateRule {
                name: "same".to_string()
            }
        );
    }

    #[test]
    fn test_order_does_not_change_classification() {
        let forward = RuleSet::from_rules(vec![
            threshold("a", 1, Severity::Error),
            threshold("b", 50, Severity::Warning),
            threshold("c", 100, Severity::Error),
        ])
        .unwrap();
        let reverse = RuleSet::from_rules(vec![
            threshold("c", 100, Severity::Error),
            threshold("b", 50, Severity::Warning),
            threshold("a", 1, Severity::Error),
        ])
        .unwrap();

        let x = forward.evaluate(&75, &ctx());
        let y = reverse.evaluate(&75, &ctx());
        assert_eq!(x.is_valid, y.is_valid);
        assert_eq!(x.rule_results, y.rule_results);
        assert_eq!(x.errors.len(), y.errors.len());
        assert_eq!(x.warnings.len(), y.warnings.len());
    }
}
