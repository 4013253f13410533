//! Foundation types for the tamper-evident audit ledger (TEL).
//!
//! Every other TEL crate depends on `tel-types`. The types here carry no
//! behavior beyond construction, validation helpers, and serialization;
//! hashing lives in `tel-crypto` and persistence in `tel-store`.
//!
//! # Key Types
//!
//! - [`LedgerEntry`] -- One immutable, hash-linked record of a compliance event
//! - [`AuditEvent`] -- The raw event a collaborator submits for recording
//! - [`Digest`] -- Fixed-length BLAKE3 digest, rendered as lowercase hex
//! - [`GENESIS`] -- The `previous_hash` of sequence 0 (all zeros)
//! - [`ChainState`] -- Derived `{latest_sequence_number, latest_hash}` tip
//! - [`OrganizationId`] -- Key of an independent per-organization ledger

pub mod chain;
pub mod digest;
pub mod entry;
pub mod error;
pub mod organization;

pub use chain::{next_link, ChainState};
pub use digest::{Digest, DIGEST_LEN, GENESIS};
pub use entry::{event_types, Actor, ActorType, AuditEvent, EventType, LedgerEntry, Payload, Resource};
pub use error::TypeError;
pub use organization::OrganizationId;
