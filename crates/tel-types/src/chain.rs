use serde::{Deserialize, Serialize};

use crate::digest::{Digest, GENESIS};
use crate::entry::LedgerEntry;

/// Derived chain tip: the last persisted entry's position and hash.
///
/// Never an independent source of truth. It is always re-derivable from
/// the store's last persisted entry and only exists so appends need not
/// rescan the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub latest_sequence_number: u64,
    pub latest_hash: Digest,
}

impl ChainState {
    pub fn of(entry: &LedgerEntry) -> Self {
        Self {
            latest_sequence_number: entry.sequence_number,
            latest_hash: entry.entry_hash,
        }
    }

    /// Sequence number the next appended entry must take.
    pub fn next_sequence(&self) -> u64 {
        self.latest_sequence_number + 1
    }
}

/// `(sequence_number, previous_hash)` for the entry following `tip`.
///
/// An empty ledger (`None`) yields `(0, GENESIS)`.
pub fn next_link(tip: Option<&ChainState>) -> (u64, Digest) {
    match tip {
        Some(state) => (state.next_sequence(), state.latest_hash),
        None => (0, GENESIS),
    }
}
