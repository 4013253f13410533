//! Tamper-evident audit ledger core.
//!
//! Records compliance events as an append-only, hash-linked chain, one
//! chain per organization, and proves after the fact whether any stored
//! entry was altered, reordered, or removed.
//!
//! - [`EntryBuilder`] validates raw events before they get a chain position
//! - [`AppendCoordinator`] linearizes concurrent appends; the chain never forks
//! - [`Verifier`] replays the chain and reports every anomaly at its own position
//! - [`AuditLedger`] is the per-organization facade; [`LedgerRegistry`] holds many
//!
//! Verification failures are data ([`VerificationResult`]), not errors.

pub mod builder;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod query;
pub mod registry;
pub mod verifier;

pub use builder::{Clock, EntryBuilder, SystemClock, ValidatedEvent};
pub use config::{ConfigError, LedgerConfig};
pub use coordinator::AppendCoordinator;
pub use error::{LedgerError, LedgerResult};
pub use ledger::AuditLedger;
pub use query::EntryFilter;
pub use registry::LedgerRegistry;
pub use verifier::{Anomaly, AnomalyKind, VerificationResult, Verifier};
