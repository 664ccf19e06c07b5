//! Rule verdicts and classified results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Severity of a failing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Hard failure; the assessment is invalid.
    Error,
    /// Soft finding; reported but does not invalidate.
    Warning,
}

impl Severity {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule's evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    /// The check held.
    Passed,
    /// The check did not hold.
    Failed,
    /// The rule itself broke; its detail is in the result message.
    Errored,
}

/// Unexpected failure inside a rule, as opposed to a failing verdict.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RuleEvaluationError {
    /// A required parameter was absent from the context.
    #[error("missing parameter: {name}")]
    MissingParameter {
        /// The parameter name.
        name: String,
    },

    /// The record could not be interpreted by the rule.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Why the input is unusable.
        reason: String,
    },

    /// The rule panicked.
    #[error("rule panicked: {detail}")]
    Panicked {
        /// The panic payload, when it was a string.
        detail: String,
    },

    /// The rule produced non-finite numeric evidence.
    #[error("non-finite numeric evidence for key {key}")]
    NonFiniteEvidence {
        /// The offending evidence key.
        key: String,
    },
}

impl RuleEvaluationError {
    /// Creates a new invalid input error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Creates a new missing parameter error.
    #[must_use]
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }
}

/// What a rule returns: pass/fail plus the detail backing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    passed: bool,
    message: String,
    evidence: BTreeMap<String, f64>,
    inputs: BTreeMap<String, Value>,
}

impl Verdict {
    /// A passing verdict.
    #[must_use]
    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(true, message)
    }

    /// A failing verdict.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(false, message)
    }

    /// A verdict that passes iff `passed`.
    #[must_use]
    pub fn new(passed: bool, message: impl Into<String>) -> Self {
        Self {
            passed,
            message: message.into(),
            evidence: BTreeMap::new(),
            inputs: BTreeMap::new(),
        }
    }

    /// Attaches a numeric observation (e.g. a computed delta).
    #[must_use]
    pub fn with_evidence(mut self, key: impl Into<String>, value: f64) -> Self {
        self.evidence.insert(key.into(), value);
        self
    }

    /// Attaches a rule input as it was observed.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// Whether the check held.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn into_parts(
        self,
    ) -> (bool, String, BTreeMap<String, f64>, BTreeMap<String, Value>) {
        (self.passed, self.message, self.evidence, self.inputs)
    }
}

/// A verdict stamped with the identity of the rule that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    /// Rule name, unique within its rule set.
    pub rule: String,
    /// Risk category the rule reports under.
    pub category: String,
    /// How evaluation ended.
    pub outcome: RuleOutcome,
    /// Severity the rule reports failures at.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Numeric observations.
    pub evidence: BTreeMap<String, f64>,
    /// Rule inputs as observed.
    pub inputs: BTreeMap<String, Value>,
}

impl RuleResult {
    /// Whether this result should surface as a finding.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome == RuleOutcome::Failed
    }

    /// Short, attributable form of the message.
    #[must_use]
    pub fn to_message(&self) -> RuleMessage {
        RuleMessage {
            rule: self.rule.clone(),
            category: self.category.clone(),
            message: self.message.clone(),
        }
    }
}

/// An error or warning line attributed to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMessage {
    /// Rule name.
    pub rule: String,
    /// Rule category.
    pub category: String,
    /// Human-readable message.
    pub message: String,
}
