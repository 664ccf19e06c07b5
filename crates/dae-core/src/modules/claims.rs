//! Insurance-claim forensics.
//!
//! Reconciles a claim against its policy and the payment transactions booked
//! for it. Amounts are compared with a relative tolerance, dates inclusively,
//! and currencies and claim types as normalized tokens.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, check_fraction};
use crate::orchestrator::AssessmentEngine;
use crate::rules::{
    Rule, RuleContext, RuleEvaluationError, RuleSet, RuleSetError, Severity, Verdict,
    dates_ordered, normalize_token, parse_date, relative_delta, within_relative_tolerance,
};

/// Engine name.
pub const ENGINE_NAME: &str = "claim_forensics";

/// Policy terms the claim is filed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTerms {
    /// Policy identifier.
    pub policy_id: String,
    /// Policy currency.
    pub currency: String,
    /// Claim types the policy covers.
    #[serde(default)]
    pub covered_types: Vec<String>,
}

/// One booked payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimTransaction {
    /// Transaction identifier.
    pub transaction_id: String,
    /// Booked amount.
    pub amount: f64,
    /// Booking currency.
    pub currency: String,
}

/// A claim with its policy and transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Claim identifier.
    pub claim_id: String,
    /// System the claim was exported from.
    pub source_system: String,
    /// Claimed amount.
    pub claim_amount: f64,
    /// Claim currency.
    pub currency: String,
    /// Claim type, e.g. `collision`.
    pub claim_type: String,
    /// Date of the incident (`YYYY-MM-DD` or RFC 3339).
    pub incident_date: String,
    /// Date the claim was reported.
    pub reported_date: String,
    /// Policy terms.
    pub policy: PolicyTerms,
    /// Booked transactions.
    #[serde(default)]
    pub transactions: Vec<ClaimTransaction>,
}

/// `[engines.claim_forensics]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimForensicsConfig {
    /// Kill switch.
    pub enabled: bool,
    /// Relative tolerance for claim amount versus transaction total.
    pub amount_tolerance: f64,
}

impl ClaimForensicsConfig {
    /// Checks parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the tolerance is outside
    /// `(0, 1)`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction(ENGINE_NAME, "amount_tolerance", self.amount_tolerance, false)
    }
}

/// The claim forensics engine.
#[derive(Debug)]
pub struct ClaimForensics {
    config: ClaimForensicsConfig,
    rules: RuleSet<ClaimRecord>,
}

impl ClaimForensics {
    /// Builds the rule set from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError`] if two rules share a name.
    pub fn new(config: &ClaimForensicsConfig) -> Result<Self, RuleSetError> {
        let rules: Vec<Box<dyn Rule<ClaimRecord>>> = vec![
            Box::new(AmountMatchesTransactions {
                tolerance: config.amount_tolerance,
            }),
            Box::new(IncidentBeforeReport),
            Box::new(CurrencyConsistent),
            Box::new(UniqueTransactions),
            Box::new(ClaimTypeCovered),
        ];
        Ok(Self {
            config: config.clone(),
            rules: RuleSet::from_rules(rules)?,
        })
    }
}

impl AssessmentEngine for ClaimForensics {
    const NAME: &'static str = ENGINE_NAME;
    const VERSION: &'static str = "1.0.0";

    type Record = ClaimRecord;
    type Config = ClaimForensicsConfig;

    fn config(&self) -> &ClaimForensicsConfig {
        &self.config
    }

    fn rules(&self) -> &RuleSet<ClaimRecord> {
        &self.rules
    }

    fn source_systems(&self, record: &ClaimRecord) -> Vec<String> {
        vec![record.source_system.clone()]
    }
}

struct AmountMatchesTransactions {
    tolerance: f64,
}

impl Rule<ClaimRecord> for AmountMatchesTransactions {
    fn name(&self) -> &str {
        "claim_amount_matches_transactions"
    }

    fn category(&self) -> &str {
        "amount_consistency"
    }

    fn evaluate(
        &self,
        record: &ClaimRecord,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        if record.transactions.is_empty() {
            return Ok(Verdict::fail(format!(
                "claim {} has no transactions to reconcile",
                record.claim_id
            ))
            .with_evidence("claim_amount", record.claim_amount));
        }
        let total: f64 = record.transactions.iter().map(|t| t.amount).sum();
        let delta = relative_delta(record.claim_amount, total);
        let verdict = if within_relative_tolerance(record.claim_amount, total, self.tolerance) {
            Verdict::pass(format!(
                "claim amount {} within {:.2}% of transaction total {total}",
                record.claim_amount,
                self.tolerance * 100.0
            ))
        } else {
            Verdict::fail(format!(
                "claim amount {} differs from transaction total {total} by {:.2}% (tolerance {:.2}%)",
                record.claim_amount,
                delta * 100.0,
                self.tolerance * 100.0
            ))
        };
        Ok(verdict
            .with_evidence("claim_amount", record.claim_amount)
            .with_evidence("transaction_total", total)
            .with_evidence("relative_delta", delta)
            .with_evidence("tolerance", self.tolerance))
    }
}

struct IncidentBeforeReport;

impl Rule<ClaimRecord> for IncidentBeforeReport {
    fn name(&self) -> &str {
        "incident_before_report"
    }

    fn category(&self) -> &str {
        "date_consistency"
    }

    fn evaluate(
        &self,
        record: &ClaimRecord,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let incident = parse_date("incident_date", &record.incident_date)?;
        let reported = parse_date("reported_date", &record.reported_date)?;
        let verdict = if dates_ordered(incident, reported) {
            Verdict::pass(format!("incident {incident} on or before report {reported}"))
        } else {
            Verdict::fail(format!(
                "incident_date {incident} is after reported_date {reported}"
            ))
        };
        #[allow(clippy::cast_precision_loss)]
        let lag_days = (reported - incident).num_days() as f64;
        Ok(verdict
            .with_evidence("report_lag_days", lag_days)
            .with_input("incident_date", incident.to_string())
            .with_input("reported_date", reported.to_string()))
    }
}

struct CurrencyConsistent;

impl Rule<ClaimRecord> for CurrencyConsistent {
    fn name(&self) -> &str {
        "currency_consistent"
    }

    fn category(&self) -> &str {
        "currency_consistency"
    }

    fn evaluate(
        &self,
        record: &ClaimRecord,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let currencies: BTreeSet<String> = std::iter::once(&record.currency)
            .chain(std::iter::once(&record.policy.currency))
            .chain(record.transactions.iter().map(|t| &t.currency))
            .map(|c| normalize_token(c))
            .collect();
        let verdict = if currencies.len() == 1 {
            Verdict::pass("claim, policy and transactions share one currency")
        } else {
            Verdict::fail(format!(
                "mixed currencies: {}",
                currencies.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            ))
        };
        Ok(verdict.with_input("currencies", currencies.into_iter().collect::<Vec<_>>()))
    }
}

struct UniqueTransactions;

impl Rule<ClaimRecord> for UniqueTransactions {
    fn name(&self) -> &str {
        "no_duplicate_transactions"
    }

    fn category(&self) -> &str {
        "duplicate_transactions"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(
        &self,
        record: &ClaimRecord,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let mut seen = BTreeSet::new();
        let duplicated: BTreeSet<&str> = record
            .transactions
            .iter()
            .map(|t| t.transaction_id.as_str())
            .filter(|id| !seen.insert(*id))
            .collect();
        if duplicated.is_empty() {
            Ok(Verdict::pass("transaction ids are unique"))
        } else {
            Ok(Verdict::fail(format!(
                "duplicate transactions: {}",
                duplicated.into_iter().collect::<Vec<_>>().join(", ")
            )))
        }
    }
}

struct ClaimTypeCovered;

impl Rule<ClaimRecord> for ClaimTypeCovered {
    fn name(&self) -> &str {
        "claim_type_covered"
    }

    fn category(&self) -> &str {
        "coverage"
    }

    fn evaluate(
        &self,
        record: &ClaimRecord,
        _ctx: &RuleContext,
    ) -> Result<Verdict, RuleEvaluationError> {
        let claim_type = normalize_token(&record.claim_type);
        let covered = record
            .policy
            .covered_types
            .iter()
            .any(|t| normalize_token(t) == claim_type);
        let verdict = if covered {
            Verdict::pass(format!("{claim_type} covered by policy {}", record.policy.policy_id))
        } else {
            Verdict::fail(format!(
                "{claim_type} not covered by policy {}",
                record.policy.policy_id
            ))
        };
        Ok(verdict.with_input("claim_type", claim_type))
    }
}
