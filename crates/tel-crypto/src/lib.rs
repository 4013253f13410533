//! Canonical encoding and chain hashing for the tamper-evident ledger.
//!
//! Provides RFC 8785 (JCS) canonical bytes for ledger entries and the
//! single BLAKE3 chain-hash function shared by the append path and the
//! verifier. Both sides must go through [`ChainHasher::entry_hash`]; a
//! second hashing path would silently break verification.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod canonical;
pub mod chain;

pub use canonical::{format_timestamp, CanonicalBytes, CanonicalError};
pub use chain::ChainHasher;
