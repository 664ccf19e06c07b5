//! The audit trail recorder.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::clock::{Clock, SystemClock};
use super::risk_line::{COMPLIANCE_TARGET, RISK_LINE_VERSION, format_risk_line};
use crate::crypto::{ContentHasher, Hash, HashChainError, hex_decode, hex_encode};
use crate::dataset::DatasetVersionId;
use crate::determinism::{CanonicalError, canonical_json};

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// An entity or run was created.
    Creation,
    /// An entity was superseded.
    Update,
    /// Records were handed to the persistence collaborator.
    Transaction,
    /// Validation rules were evaluated.
    Validation,
    /// Risk analysis produced findings.
    ForensicAnalysis,
}

impl AuditAction {
    /// Canonical snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Update => "update",
            Self::Transaction => "transaction",
            Self::Validation => "validation",
            Self::ForensicAnalysis => "forensic_analysis",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the audit trail.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuditError {
    /// An entry could not be canonicalized for hashing.
    #[error("audit entry not canonicalizable: {0}")]
    Canonical(#[from] CanonicalError),

    /// The hash chain does not verify.
    #[error("audit chain invalid: {0}")]
    Chain(#[from] HashChainError),
}

/// One append-only trail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Zero-based position in the trail.
    pub sequence: u64,
    /// Event kind.
    pub action: AuditAction,
    /// Dataset version the event concerns.
    pub dataset_version_id: DatasetVersionId,
    /// Sorted, deduplicated source systems.
    pub source_systems: Vec<String>,
    /// Free-text description.
    pub description: String,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Hex hash of the previous entry (zeros for the first).
    pub prev_hash: String,
    /// Hex hash of this entry chained onto `prev_hash`.
    pub entry_hash: String,
}

#[derive(Serialize)]
struct ChainedContent<'a> {
    sequence: u64,
    action: AuditAction,
    dataset_version_id: &'a DatasetVersionId,
    source_systems: &'a [String],
    description: &'a str,
    timestamp: &'a DateTime<Utc>,
}

impl AuditLogEntry {
    fn chained_bytes(&self) -> Result<Vec<u8>, CanonicalError> {
        canonical_json(&ChainedContent {
            sequence: self.sequence,
            action: self.action,
            dataset_version_id: &self.dataset_version_id,
            source_systems: &self.source_systems,
            description: &self.description,
            timestamp: &self.timestamp,
        })
    }
}

/// Counts over the trail recorded so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Number of entries.
    pub total_entries: usize,
    /// Entries per action kind.
    pub action_counts: BTreeMap<AuditAction, usize>,
}

impl AuditSummary {
    /// Counts a slice of entries.
    #[must_use]
    pub fn from_entries(entries: &[AuditLogEntry]) -> Self {
        let mut action_counts = BTreeMap::new();
        for entry in entries {
            *action_counts.entry(entry.action).or_insert(0) += 1;
        }
        Self {
            total_entries: entries.len(),
            action_counts,
        }
    }
}

/// Per-run append-only trail.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    entries: Vec<AuditLogEntry>,
    last_hash: Hash,
    clock: Arc<dyn Clock>,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditTrail {
    /// Creates an empty trail on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty trail on the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Vec::new(),
            last_hash: ContentHasher::GENESIS_PREV_HASH,
            clock,
        }
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Canonical`] if the entry cannot be hashed; the
    /// trail is left unchanged.
    pub fn record(
        &mut self,
        action: AuditAction,
        dataset_version_id: &DatasetVersionId,
        source_systems: &[String],
        description: impl Into<String>,
    ) -> Result<&AuditLogEntry, AuditError> {
        let mut sorted = source_systems.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut entry = AuditLogEntry {
            sequence: self.entries.len() as u64,
            action,
            dataset_version_id: dataset_version_id.clone(),
            source_systems: sorted,
            description: description.into(),
            timestamp: self.clock.now(),
            prev_hash: hex_encode(&self.last_hash),
            entry_hash: String::new(),
        };
        let hash = ContentHasher::hash_chained(&entry.chained_bytes()?, &self.last_hash);
        entry.entry_hash = hex_encode(&hash);

        self.last_hash = hash;
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Pure read over the entries recorded so far.
    #[must_use]
    pub fn summarize(&self) -> AuditSummary {
        AuditSummary::from_entries(&self.entries)
    }

    /// Entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[AuditLogEntry] {
        &self.entries
    }

    /// Consumes the trail, yielding its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<AuditLogEntry> {
        self.entries
    }

    /// Hex hash of the latest entry (zeros when empty).
    #[must_use]
    pub fn head(&self) -> String {
        hex_encode(&self.last_hash)
    }

    /// Emits the compliance risk line at WARN and returns it.
    ///
    /// Returns `None`, and logs nothing, when `risks` is empty.
    pub fn warn_risks(
        &self,
        engine: &str,
        dataset_version_id: &DatasetVersionId,
        source_systems: &[String],
        risks: &[String],
    ) -> Option<String> {
        if risks.is_empty() {
            return None;
        }
        let mut sorted = source_systems.to_vec();
        sorted.sort();
        sorted.dedup();
        let line = format_risk_line(engine, dataset_version_id.as_str(), &sorted, risks);
        warn!(target: COMPLIANCE_TARGET, risk_line_version = RISK_LINE_VERSION, "{line}");
        Some(line)
    }

    /// Verifies a persisted sequence of entries.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Chain`] on the first broken link or edited entry.
    pub fn verify_chain(entries: &[AuditLogEntry]) -> Result<(), AuditError> {
        let mut links = Vec::with_capacity(entries.len());
        for entry in entries {
            let prev = hex_decode(&entry.prev_hash)?;
            let hash = hex_decode(&entry.entry_hash)?;
            links.push((entry.chained_bytes()?, prev, hash));
        }
        ContentHasher::verify_chain(
            links
                .iter()
                .map(|(content, prev, hash)| (content.as_slice(), prev, hash)),
        )?;
        Ok(())
    }
}
