//! # dae-core
//!
//! Deterministic assessment engine.
//!
//! Given an immutable dataset snapshot and a set of parameters, an engine runs
//! a battery of pure validation and risk rules and produces:
//!
//! - content-addressed, tamper-evident [`Evidence`](evidence::Evidence)
//! - [`Finding`](evidence::Finding)s with deterministic identifiers
//! - an append-only, hash-chained audit trail and a compliance risk line
//!
//! Same inputs always yield byte-identical outputs, entities are write-once,
//! and every finding is attributable to the dataset version and rules that
//! produced it.
//!
//! # Modules
//!
//! - [`immutability`]: write-once guard, seals and the read-only mapping
//! - [`determinism`]: canonical JSON and deterministic identifiers
//! - [`crypto`]: BLAKE3 hashing and hash chains
//! - [`dataset`]: dataset versions, payload views and the ingestion contract
//! - [`rules`]: the rule engine and shared comparison helpers
//! - [`evidence`]: evidence records, findings and the emitter
//! - [`audit`]: the audit trail and the compliance risk line
//! - [`orchestrator`]: the run pipeline, service and registry
//! - [`store`]: the persistence contract and an in-memory backend
//! - [`config`]: TOML configuration
//! - [`modules`]: the migration, ERP integration and claim forensics engines
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use dae_core::modules::{ClaimForensics, ClaimForensicsConfig};
//! use dae_core::orchestrator::{Orchestrator, RunRequest, RunStatus};
//! use serde_json::json;
//!
//! let engine = ClaimForensics::new(&ClaimForensicsConfig {
//!     enabled: true,
//!     amount_tolerance: 0.01,
//! })?;
//! let orchestrator = Orchestrator::new(engine);
//!
//! let payload = json!({
//!     "claim_id": "CLM-1",
//!     "source_system": "claims_core",
//!     "claim_amount": 10000.0,
//!     "currency": "USD",
//!     "claim_type": "collision",
//!     "incident_date": "2023-12-15",
//!     "reported_date": "2024-01-01",
//!     "policy": {"policy_id": "POL-9", "currency": "USD", "covered_types": ["collision"]},
//!     "transactions": [{"transaction_id": "T-1", "amount": 10050.0, "currency": "USD"}]
//! });
//! let started_at = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
//! let report = orchestrator.run(&RunRequest::new("dv-claims-1", payload, started_at))?;
//!
//! assert_eq!(report.status, RunStatus::Passed);
//! assert!(report.findings.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod config;
pub mod crypto;
pub mod dataset;
pub mod determinism;
pub mod evidence;
pub mod immutability;
pub mod modules;
pub mod orchestrator;
pub mod rules;
pub mod store;

pub use config::{ConfigError, DaeConfig};
pub use dataset::DatasetVersionId;
pub use determinism::DeterministicId;
pub use orchestrator::{EngineRegistry, Orchestrator, RunError, RunReport, RunRequest, RunStatus};
