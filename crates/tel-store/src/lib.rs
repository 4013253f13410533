//! Append-only entry storage for the tamper-evident ledger.
//!
//! Every backend implements [`LedgerStore`], whose only write primitive is
//! [`LedgerStore::append_if_next`]: it persists an entry at a given
//! sequence number or fails with [`StoreError::SequenceConflict`] when that
//! position is no longer the next free one. That failure is the race
//! detector the append coordinator retries on.
//!
//! # Storage Backends
//!
//! - [`InMemoryLedgerStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`FileLedgerStore`] -- single append-only segment file with
//!   length + CRC32 framing and torn-tail recovery
//!
//! # Design Rules
//!
//! 1. There is no update or delete operation.
//! 2. An entry becomes readable only after it is fully persisted.
//! 3. Sequence numbers are unique; an entry must link to the stored tail.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod range;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::{encode_record, FileLedgerStore, RecoveryReport, SkippedRecord, SyncMode};
pub use memory::InMemoryLedgerStore;
pub use range::{EntryRange, Keyed, DEFAULT_PAGE_SIZE};
pub use traits::LedgerStore;
