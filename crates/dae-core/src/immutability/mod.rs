//! Immutability guard for dataset snapshots, evidence and findings.
//!
//! Protected entities are write-once. Rust already refuses mutation through
//! shared references; this module closes the remaining gaps:
//!
//! - Protected types keep their fields private and expose no `&mut`
//!   accessors. The only write entry point, [`Protected::try_set`], always
//!   fails with [`ImmutabilityViolation`], even with exclusive access.
//! - Every protected entity carries a seal: a domain-separated BLAKE3 digest
//!   of its canonical form taken at construction. A record that was edited
//!   while serialized (in a store, on disk, in transit) fails
//!   [`Protected::verify_seal`] once it is read back.
//! - The [`ImmutabilityGuard`] is installed once per process and is the
//!   single place violations are counted and logged, whatever the call site.
//!
//! [`FrozenMap`] is the read-only mapping used for finding metadata and
//! evidence assumptions.

mod frozen_map;

use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

pub use frozen_map::FrozenMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::crypto::ContentHasher;
use crate::determinism::{CanonicalError, canonical_json, canonical_value};

/// Name of the seal field excluded from seal computation.
pub const SEAL_FIELD: &str = "seal";

/// Type names covered by the guard.
pub const PROTECTED_TYPES: &[&str] = &["DatasetVersion", "RawRecord", "Evidence", "Finding"];

/// An attempt to alter a protected entity after construction.
///
/// Always indicates a programming defect or tampering; callers must not
/// swallow it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImmutabilityViolation {
    /// A field write was attempted.
    #[error("immutability violation: attempted write to {type_name}.{field}")]
    FieldWrite {
        /// The protected type.
        type_name: &'static str,
        /// The field that was targeted.
        field: String,
    },

    /// The entity's content no longer matches the seal taken at construction.
    #[error("immutability violation: {type_name} seal mismatch (expected {expected}, got {actual})")]
    SealBroken {
        /// The protected type.
        type_name: &'static str,
        /// The seal recorded on the entity.
        expected: String,
        /// The seal recomputed from current content.
        actual: String,
    },

    /// The seal could not be recomputed.
    #[error("immutability violation: {type_name} could not be canonicalized: {reason}")]
    Unsealable {
        /// The protected type.
        type_name: &'static str,
        /// Why canonicalization failed.
        reason: String,
    },
}

/// Process-wide enforcement point for protected types.
#[derive(Debug)]
pub struct ImmutabilityGuard {
    protected: BTreeSet<&'static str>,
    violations: AtomicU64,
}

static GUARD: OnceLock<ImmutabilityGuard> = OnceLock::new();

impl ImmutabilityGuard {
    /// Installs the guard, or returns the already-installed instance.
    ///
    /// Installing twice is a no-op.
    pub fn install() -> &'static Self {
        GUARD.get_or_init(|| {
            tracing::debug!(types = ?PROTECTED_TYPES, "immutability guard installed");
            Self {
                protected: PROTECTED_TYPES.iter().copied().collect(),
                violations: AtomicU64::new(0),
            }
        })
    }

    /// Returns the guard if it has been installed.
    #[must_use]
    pub fn installed() -> Option<&'static Self> {
        GUARD.get()
    }

    /// Returns whether a type name is covered by the guard.
    #[must_use]
    pub fn is_protected(&self, type_name: &str) -> bool {
        self.protected.contains(type_name)
    }

    /// Number of violations observed by this process.
    #[must_use]
    pub fn violation_count(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Records a violation and hands it back for propagation.
    #[must_use]
    pub fn reject(&self, violation: ImmutabilityViolation) -> ImmutabilityViolation {
        self.violations.fetch_add(1, Ordering::Relaxed);
        error!(violation = %violation, "rejected mutation of protected entity");
        violation
    }
}

/// A write-once entity covered by the [`ImmutabilityGuard`].
pub trait Protected: Serialize {
    /// Type name as listed in [`PROTECTED_TYPES`].
    const TYPE_NAME: &'static str;

    /// Serialized field names.
    const FIELDS: &'static [&'static str];

    /// The seal recorded at construction.
    fn seal(&self) -> &str;

    /// Attempts to assign `field`.
    ///
    /// # Errors
    ///
    /// Always returns [`ImmutabilityViolation::FieldWrite`].
    fn try_set(&mut self, field: &str, _value: Value) -> Result<(), ImmutabilityViolation> {
        Err(
            ImmutabilityGuard::install().reject(ImmutabilityViolation::FieldWrite {
                type_name: Self::TYPE_NAME,
                field: field.to_string(),
            }),
        )
    }

    /// Recomputes the seal and compares it with the recorded one.
    ///
    /// # Errors
    ///
    /// Returns [`ImmutabilityViolation::SealBroken`] if the content changed
    /// since construction.
    fn verify_seal(&self) -> Result<(), ImmutabilityViolation>
    where
        Self: Sized,
    {
        let actual = compute_seal(self).map_err(|e| {
            ImmutabilityGuard::install().reject(ImmutabilityViolation::Unsealable {
                type_name: Self::TYPE_NAME,
                reason: e.to_string(),
            })
        })?;
        if actual != self.seal() {
            return Err(
                ImmutabilityGuard::install().reject(ImmutabilityViolation::SealBroken {
                    type_name: Self::TYPE_NAME,
                    expected: self.seal().to_string(),
                    actual,
                }),
            );
        }
        Ok(())
    }
}

/// Computes the seal of a protected entity over every field but the seal.
///
/// # Errors
///
/// Returns [`CanonicalError`] if the entity cannot be canonicalized.
pub fn compute_seal<T: Protected>(entity: &T) -> Result<String, CanonicalError> {
    seal_of(T::TYPE_NAME, entity)
}

/// Domain-separated digest of `value` with its `seal` field removed.
pub(crate) fn seal_of<T: Serialize + ?Sized>(
    domain: &str,
    value: &T,
) -> Result<String, CanonicalError> {
    let mut value = canonical_value(value)?;
    if let Value::Object(map) = &mut value {
        map.remove(SEAL_FIELD);
    }
    let bytes = canonical_json(&value)?;
    Ok(hex::encode(ContentHasher::hash_domain(domain, &bytes)))
}
