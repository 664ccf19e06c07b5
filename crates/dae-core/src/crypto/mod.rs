//! Hashing primitives shared by every component that needs tamper evidence.
//!
//! - **Content hashing**: BLAKE3 digests over canonical bytes
//! - **Hash-chain linking**: each audit entry commits to its predecessor, so
//!   editing or removing a historical entry breaks the chain

mod hash;

pub use hash::{ContentHasher, HASH_SIZE, Hash, HashChainError, hex_decode, hex_encode};
