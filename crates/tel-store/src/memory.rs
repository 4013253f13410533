use std::collections::BTreeMap;
use std::sync::RwLock;
#[cfg(feature = "fault-injection")]
use std::sync::atomic::{AtomicU32, Ordering};

use tel_types::{ChainState, LedgerEntry};

use crate::error::{poisoned, StoreError, StoreResult};
use crate::traits::{check_append, check_range, tail_of, LedgerStore};

/// In-memory, `BTreeMap`-based ledger store keyed by sequence number.
///
/// Intended for tests and embedding. The check-and-insert of
/// `append_if_next` runs under one write lock, so it is atomic with
/// respect to concurrent appenders.
pub struct InMemoryLedgerStore {
    entries: RwLock<BTreeMap<u64, LedgerEntry>>,
    #[cfg(feature = "fault-injection")]
    failing_writes: AtomicU32,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            #[cfg(feature = "fault-injection")]
            failing_writes: AtomicU32::new(0),
        }
    }

    /// Mutate persisted entries directly, bypassing every append check.
    ///
    /// Simulates an attacker or a faulty disk rewriting history.
    #[cfg(feature = "fault-injection")]
    pub fn tamper<R>(&self, f: impl FnOnce(&mut BTreeMap<u64, LedgerEntry>) -> R) -> R {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        f(&mut entries)
    }

    /// Make the next `count` appends fail with [`StoreError::Unavailable`].
    #[cfg(feature = "fault-injection")]
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    #[cfg(feature = "fault-injection")]
    fn injected_failure(&self) -> StoreResult<()> {
        let hit = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hit {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    #[cfg(not(feature = "fault-injection"))]
    fn injected_failure(&self) -> StoreResult<()> {
        Ok(())
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append_if_next(&self, entry: &LedgerEntry, expected_sequence: u64) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("ledger"))?;
        check_append(entry, expected_sequence, tail_of(entries.last_key_value()))?;
        self.injected_failure()?;
        entries.insert(expected_sequence, entry.clone());
        Ok(())
    }

    fn get_entry(&self, sequence: u64) -> StoreResult<Option<LedgerEntry>> {
        let entries = self.entries.read().map_err(|_| poisoned("ledger"))?;
        Ok(entries.get(&sequence).cloned())
    }

    fn read_page(
        &self,
        start: u64,
        end: u64,
        limit: usize,
    ) -> StoreResult<Vec<(u64, LedgerEntry)>> {
        check_range(start, end)?;
        let entries = self.entries.read().map_err(|_| poisoned("ledger"))?;
        Ok(entries
            .range(start..end)
            .take(limit)
            .map(|(k, e)| (*k, e.clone()))
            .collect())
    }

    fn get_latest(&self) -> StoreResult<Option<LedgerEntry>> {
        let entries = self.entries.read().map_err(|_| poisoned("ledger"))?;
        Ok(entries.last_key_value().map(|(_, e)| e.clone()))
    }

    fn get_tail(&self) -> StoreResult<Option<ChainState>> {
        let entries = self.entries.read().map_err(|_| poisoned("ledger"))?;
        Ok(tail_of(entries.last_key_value()))
    }

    fn entry_count(&self) -> StoreResult<u64> {
        let entries = self.entries.read().map_err(|_| poisoned("ledger"))?;
        Ok(entries.len() as u64)
    }
}

impl std::fmt::Debug for InMemoryLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entry_count().unwrap_or_default();
        f.debug_struct("InMemoryLedgerStore")
            .field("entry_count", &count)
            .finish()
    }
}
