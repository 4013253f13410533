use tel_types::{ChainState, Digest, LedgerEntry, GENESIS};

use crate::error::{StoreError, StoreResult};
use crate::range::{EntryRange, DEFAULT_PAGE_SIZE};

/// Durable, append-only ledger storage for one organization.
///
/// All implementations must satisfy these invariants:
/// - Entries are immutable once written; there is no update or delete.
/// - `append_if_next` is atomic with respect to other appends: of two
///   calls targeting the same sequence, at most one succeeds.
/// - A reader never observes a partially written entry.
/// - All I/O errors are propagated, never silently ignored.
pub trait LedgerStore: Send + Sync {
    /// Persist `entry` at `expected_sequence`.
    ///
    /// Fails with [`StoreError::SequenceConflict`] if `expected_sequence` is
    /// not the next free position, or [`StoreError::StaleLink`] if the
    /// entry's `previous_hash` does not match the stored tail. On any error
    /// nothing has been persisted.
    fn append_if_next(&self, entry: &LedgerEntry, expected_sequence: u64) -> StoreResult<()>;

    /// Read one entry by sequence number. `Ok(None)` if absent.
    fn get_entry(&self, sequence: u64) -> StoreResult<Option<LedgerEntry>>;

    /// Read up to `limit` entries stored at positions `start <= key < end`,
    /// ascending, each paired with its key.
    ///
    /// The key is where the store holds the entry. It is the authority for
    /// positions; an entry's own `sequence_number` may have been altered.
    fn read_page(&self, start: u64, end: u64, limit: usize)
        -> StoreResult<Vec<(u64, LedgerEntry)>>;

    /// The last persisted entry, or `None` for an empty ledger.
    fn get_latest(&self) -> StoreResult<Option<LedgerEntry>>;

    /// Key and stored `entry_hash` of the last persisted entry.
    fn get_tail(&self) -> StoreResult<Option<ChainState>>;

    /// Number of entries physically held by the store.
    fn entry_count(&self) -> StoreResult<u64>;

    /// Lazy ascending iterator over `start <= sequence < end`.
    ///
    /// Entries are fetched page by page; the iterator is finite and can be
    /// restarted with [`EntryRange::restart`].
    fn get_range(&self, start: u64, end: u64) -> EntryRange<'_, Self>
    where
        Self: Sized,
    {
        EntryRange::new(self, start, end, DEFAULT_PAGE_SIZE)
    }
}

/// Shared append precondition check used by every backend.
///
/// `tail` is the key and hash of the currently stored last entry.
pub(crate) fn check_append(
    entry: &LedgerEntry,
    expected_sequence: u64,
    tail: Option<ChainState>,
) -> StoreResult<()> {
    if entry.sequence_number != expected_sequence {
        return Err(StoreError::MismatchedSequence {
            entry: entry.sequence_number,
            slot: expected_sequence,
        });
    }

    let (next_free, tail_hash): (u64, Digest) = match tail {
        Some(tail) => (tail.next_sequence(), tail.latest_hash),
        None => (0, GENESIS),
    };
    if expected_sequence != next_free {
        return Err(StoreError::SequenceConflict {
            attempted: expected_sequence,
            next_free,
        });
    }
    if entry.previous_hash != tail_hash {
        return Err(StoreError::StaleLink {
            sequence: expected_sequence,
        });
    }
    Ok(())
}

pub(crate) fn tail_of(last: Option<(&u64, &LedgerEntry)>) -> Option<ChainState> {
    last.map(|(key, entry)| ChainState {
        latest_sequence_number: *key,
        latest_hash: entry.entry_hash,
    })
}

pub(crate) fn check_range(start: u64, end: u64) -> StoreResult<()> {
    if start > end {
        return Err(StoreError::InvalidRange { start, end });
    }
    Ok(())
}
