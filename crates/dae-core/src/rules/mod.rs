//! Rule engine: ordered, independent, pure validation and risk rules.
//!
//! A [`Rule`] inspects a domain record and returns a [`Verdict`]. It must not
//! mutate the record, perform I/O, or depend on other rules; registration
//! order only decides presentation order. The [`RuleSet`] stamps each verdict
//! with the rule's identity, classifies the outcome, and recovers from rules
//! that fail unexpectedly (returned error or panic) by recording an
//! [`RuleOutcome::Errored`] result and carrying on.

mod checks;
mod engine;
mod result;

pub use checks::{
    EPSILON, dates_ordered, normalize_token, parse_date, relative_delta,
    within_relative_tolerance,
};
pub use engine::{Assessment, Rule, RuleContext, RuleSet, RuleSetError};
pub use result::{RuleEvaluationError, RuleMessage, RuleOutcome, RuleResult, Severity, Verdict};
