//! Run-level errors.

use thiserror::Error;

use crate::audit::AuditError;
use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::determinism::CanonicalError;
use crate::evidence::EvidenceError;
use crate::immutability::ImmutabilityViolation;
use crate::rules::RuleSetError;
use crate::store::PersistenceError;

/// Broad classification of a [`RunError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The caller supplied missing or malformed input.
    Input,
    /// A rule set could not be assembled.
    Rule,
    /// A frozen entity was altered or failed verification.
    Integrity,
    /// The evidence/finding store failed.
    Persistence,
    /// The engine is unknown, disabled or misconfigured.
    Configuration,
}

/// A fatal run failure. No partial report accompanies it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// No dataset version id was supplied.
    #[error("dataset version id is required")]
    MissingDatasetVersion,

    /// The supplied dataset version id is not acceptable.
    #[error("invalid dataset version id: {source}")]
    InvalidDatasetVersion {
        /// The underlying error.
        #[source]
        source: DatasetError,
    },

    /// No payload was supplied.
    #[error("payload is required for dataset version {dataset_version_id}")]
    MissingPayload {
        /// The affected version.
        dataset_version_id: String,
    },

    /// The payload does not parse into the engine's record type.
    #[error("malformed payload for dataset version {dataset_version_id}: {reason}")]
    MalformedPayload {
        /// The affected version.
        dataset_version_id: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// Run parameters or engine configuration cannot be canonicalized.
    #[error("invalid parameters for dataset version {dataset_version_id}: {source}")]
    InvalidParameters {
        /// The affected version.
        dataset_version_id: String,
        /// The underlying error.
        #[source]
        source: CanonicalError,
    },

    /// The ingestion collaborator failed.
    #[error("dataset load failed for {dataset_version_id}: {source}")]
    Dataset {
        /// The affected version.
        dataset_version_id: String,
        /// The underlying error.
        #[source]
        source: DatasetError,
    },

    /// A frozen entity was written to or failed its seal check.
    #[error("integrity violation for dataset version {dataset_version_id}: {source}")]
    Integrity {
        /// The affected version.
        dataset_version_id: String,
        /// The underlying violation.
        #[source]
        source: ImmutabilityViolation,
    },

    /// Evidence or findings could not be built.
    #[error("evidence emission failed for dataset version {dataset_version_id}: {source}")]
    Evidence {
        /// The affected version.
        dataset_version_id: String,
        /// The underlying error.
        #[source]
        source: EvidenceError,
    },

    /// The audit trail could not be recorded.
    #[error("audit trail failed for dataset version {dataset_version_id}: {source}")]
    Audit {
        /// The affected version.
        dataset_version_id: String,
        /// The underlying error.
        #[source]
        source: AuditError,
    },

    /// The store rejected a write or read.
    #[error("persistence failed for dataset version {dataset_version_id}: {source}")]
    Persistence {
        /// The affected version.
        dataset_version_id: String,
        /// The underlying error.
        #[source]
        source: PersistenceError,
    },

    /// No engine is registered under the name.
    #[error("unknown engine: {engine}")]
    UnknownEngine {
        /// The requested engine.
        engine: String,
    },

    /// The engine is registered but switched off.
    #[error("engine {engine} is disabled")]
    EngineDisabled {
        /// The requested engine.
        engine: String,
    },

    /// An engine's rule set could not be assembled.
    #[error(transparent)]
    Rules(#[from] RuleSetError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RunError {
    /// Classifies the error.
    #[must_use]
    pub const fn error_class(&self) -> ErrorClass {
        match self {
            Self::MissingDatasetVersion
            | Self::InvalidDatasetVersion { .. }
            | Self::MissingPayload { .. }
            | Self::MalformedPayload { .. }
            | Self::InvalidParameters { .. }
            | Self::Dataset { .. } => ErrorClass::Input,
            Self::Integrity { .. } | Self::Evidence { .. } | Self::Audit { .. } => {
                ErrorClass::Integrity
            },
            Self::Persistence { .. } => ErrorClass::Persistence,
            Self::Rules(_) => ErrorClass::Rule,
            Self::UnknownEngine { .. } | Self::EngineDisabled { .. } | Self::Config(_) => {
                ErrorClass::Configuration
            },
        }
    }

    /// The dataset version the failure concerns, when one was known.
    #[must_use]
    pub fn dataset_version_id(&self) -> Option<&str> {
        match self {
            Self::MissingPayload { dataset_version_id }
            | Self::MalformedPayload {
                dataset_version_id, ..
            }
            | Self::InvalidParameters {
                dataset_version_id, ..
            }
            | Self::Dataset {
                dataset_version_id, ..
            }
            | Self::Integrity {
                dataset_version_id, ..
            }
            | Self::Evidence {
                dataset_version_id, ..
            }
            | Self::Audit {
                dataset_version_id, ..
            }
            | Self::Persistence {
                dataset_version_id, ..
            } => Some(dataset_version_id),
            _ => None,
        }
    }
}
