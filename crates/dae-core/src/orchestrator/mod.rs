//! Run orchestration.
//!
//! A run is a single synchronous pipeline over one dataset version:
//!
//! 1. Validate that a dataset version id and a payload were supplied
//! 2. Parse the payload into the engine's record type
//! 3. Evaluate the engine's rules
//! 4. Emit evidence and findings
//! 5. Record the audit trail and the compliance risk line
//! 6. Assemble the [`RunReport`]
//!
//! [`Orchestrator`] keeps no state between calls, so one instance can serve
//! concurrent runs from many threads. [`EngineService`] adds persistence and
//! [`EngineRegistry`] selects engines by name at the composition root.

mod error;
mod registry;
mod report;
mod run;
mod service;

pub use error::{ErrorClass, RunError};
pub use registry::{EngineInfo, EngineRegistry};
pub use report::{ReportIntegrityError, RunReport, RunRequest, RunStatus};
pub use run::{AssessmentEngine, EngineRunner, Orchestrator};
pub use service::EngineService;
