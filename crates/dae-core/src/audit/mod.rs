//! Append-only, hash-chained audit trail and the compliance risk line.
//!
//! Every lifecycle event in a run appends one [`AuditLogEntry`]. Entries are
//! never edited or removed; each commits to its predecessor's hash so
//! [`AuditTrail::verify_chain`] detects any after-the-fact edit, insertion or
//! removal in a persisted trail.
//!
//! When a run surfaces at least one risk, [`AuditTrail::warn_risks`] emits the
//! compliance line consumed by log aggregation:
//!
//! ```text
//! <ENGINE>_RISKS dataset_version_id=<id> source_systems=(<tuple>) risks=[<list>]
//! ```

mod clock;
mod risk_line;
mod trail;

pub use clock::{Clock, FixedClock, SystemClock};
pub use risk_line::{COMPLIANCE_TARGET, RISK_LINE_VERSION, format_risk_line};
pub use trail::{AuditAction, AuditError, AuditLogEntry, AuditSummary, AuditTrail};
