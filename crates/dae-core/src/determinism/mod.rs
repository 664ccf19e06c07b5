//! Determinism primitives for reproducible assessment output.
//!
//! - **Canonical JSON**: sorted keys, no insignificant whitespace, bounded
//!   depth; the byte form every digest in this crate is computed over
//! - **Deterministic IDs**: identifiers derived purely from canonicalized
//!   inputs, so reruns over identical inputs converge on identical records
//!
//! The ID scheme ([`ID_SCHEME`]) is a frozen interface: persisted findings and
//! audit trails key on IDs produced under it.
//!
//! # Example
//!
//! ```
//! use dae_core::determinism::{canonical_json, generate_id};
//!
//! let a = generate_id("dv-1", "structural", &["error", "migration_readiness"]);
//! let b = generate_id("dv-1", "structural", &["migration_readiness", "error"]);
//! assert_eq!(a, b);
//!
//! let bytes = canonical_json(&serde_json::json!({"z": 1, "a": [true, null]})).unwrap();
//! assert_eq!(bytes, br#"{"a":[true,null],"z":1}"#);
//! ```

mod canonical;
mod id;

pub use canonical::{CanonicalError, MAX_DEPTH, canonical_json, canonical_value};
pub use id::{DeterministicId, ID_HEX_LEN, ID_SCHEME, content_digest, content_id, generate_id};
