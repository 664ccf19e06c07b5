//! Evidence and finding emission.
//!
//! Failing rule results are grouped by `(category, severity)`. Each group
//! becomes one [`Finding`] (summarized, queryable, deterministically
//! identified) linked to one [`Evidence`] record (full rule detail,
//! content-addressed). Both are bound to a dataset version and a result-set
//! identifier and are sealed at construction.
//!
//! Groups and their members are ordered by name, never by rule registration
//! order, so permuting a rule set cannot change any emitted identifier.

mod emitter;
mod error;
mod finding;
mod record;

pub use emitter::{EmitRequest, Emission, FindingEmitter};
pub use error::EvidenceError;
pub use finding::Finding;
pub use record::{CHECK_TYPE_RULE_EVALUATION, Evidence};

#[cfg(test)]
mod tests;
