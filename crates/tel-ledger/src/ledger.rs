use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tel_store::{EntryRange, FileLedgerStore, InMemoryLedgerStore, LedgerStore};
use tel_types::{AuditEvent, ChainState, Digest, LedgerEntry};

use crate::builder::{Clock, EntryBuilder};
use crate::config::LedgerConfig;
use crate::coordinator::AppendCoordinator;
use crate::error::LedgerResult;
use crate::query::{self, EntryFilter};
use crate::verifier::{VerificationResult, Verifier};

/// One organization's tamper-evident ledger.
///
/// Appends go through the [`AppendCoordinator`]; reads and verification go
/// straight to the store and never wait on the append lock.
pub struct AuditLedger<S: LedgerStore> {
    store: Arc<S>,
    coordinator: AppendCoordinator<S>,
    page_size: usize,
}

impl<S: LedgerStore> AuditLedger<S> {
    pub fn new(store: S, config: &LedgerConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Build a ledger over a store that other writers may also append to.
    pub fn with_shared_store(store: Arc<S>, config: &LedgerConfig) -> Self {
        let coordinator = AppendCoordinator::new(
            store.clone(),
            EntryBuilder::new(config.max_payload_bytes),
            config.max_append_retries,
        );
        Self {
            store,
            coordinator,
            page_size: config.page_size.max(1),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.coordinator = self.coordinator.with_clock(clock);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn append(&self, event: AuditEvent) -> LedgerResult<LedgerEntry> {
        self.coordinator.append(event)
    }

    pub fn get_entry(&self, sequence: u64) -> LedgerResult<Option<LedgerEntry>> {
        Ok(self.store.get_entry(sequence)?)
    }

    /// Lazy ascending scan of `start <= sequence < end`.
    pub fn get_range(&self, start: u64, end: u64) -> LedgerResult<EntryRange<'_, S>> {
        query::check_range(start, end)?;
        Ok(EntryRange::new(self.store.as_ref(), start, end, self.page_size))
    }

    /// Current tip as persisted in the store.
    pub fn head(&self) -> LedgerResult<Option<ChainState>> {
        Ok(self.store.get_tail()?)
    }

    pub fn entry_count(&self) -> LedgerResult<u64> {
        Ok(self.store.entry_count()?)
    }

    pub fn full_verify(&self) -> LedgerResult<VerificationResult> {
        Verifier::new(self.store.as_ref(), self.page_size).full_verify()
    }

    pub fn incremental_verify(
        &self,
        from_sequence: u64,
        known_good_previous_hash: Digest,
    ) -> LedgerResult<VerificationResult> {
        Verifier::new(self.store.as_ref(), self.page_size)
            .incremental_verify(from_sequence, known_good_previous_hash)
    }

    /// Continue from the checkpoint of an earlier pass.
    ///
    /// With no checkpoint (nothing verified yet) this is a full pass.
    pub fn verify_since(&self, checkpoint: Option<&ChainState>) -> LedgerResult<VerificationResult> {
        match checkpoint {
            Some(cp) => self.incremental_verify(cp.next_sequence(), cp.latest_hash),
            None => self.full_verify(),
        }
    }

    pub fn query(
        &self,
        start: u64,
        end: u64,
        filter: &EntryFilter,
        limit: usize,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        query::query(self.store.as_ref(), start, end, filter, limit, self.page_size)
    }

    pub fn export_jsonl<W: Write>(&self, writer: &mut W, start: u64, end: u64) -> LedgerResult<u64> {
        query::export_jsonl(self.store.as_ref(), writer, start, end, self.page_size)
    }
}

impl AuditLedger<FileLedgerStore> {
    /// Open the file-backed ledger whose segment lives at `path`.
    pub fn open(path: impl AsRef<Path>, config: &LedgerConfig) -> LedgerResult<Self> {
        let store = FileLedgerStore::open(path, config.sync)?;
        Ok(Self::new(store, config))
    }
}

impl AuditLedger<InMemoryLedgerStore> {
    pub fn in_memory(config: &LedgerConfig) -> Self {
        Self::new(InMemoryLedgerStore::new(), config)
    }
}

impl<S: LedgerStore> std::fmt::Debug for AuditLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("coordinator", &self.coordinator)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use tel_types::{Actor, Resource, GENESIS};

    fn event(kind: &str) -> AuditEvent {
        AuditEvent::new(kind, Actor::system("scanner"), Resource::new("repository", "repoA"))
    }

    #[test]
    fn head_follows_appends() {
        let ledger = AuditLedger::in_memory(&LedgerConfig::default());
        assert_eq!(ledger.head().unwrap(), None);
        let e = ledger.append(event("assessment_completed")).unwrap();
        assert_eq!(ledger.head().unwrap(), Some(ChainState::of(&e)));
        assert_eq!(ledger.entry_count().unwrap(), 1);
    }

    #[test]
    fn get_range_rejects_inverted_bounds() {
        let ledger = AuditLedger::in_memory(&LedgerConfig::default());
        assert!(matches!(
            ledger.get_range(3, 1),
            Err(LedgerError::InvalidRange { start: 3, end: 1 })
        ));
    }

    #[test]
    fn verify_since_picks_up_where_it_left_off() {
        let ledger = AuditLedger::in_memory(&LedgerConfig::default());
        for _ in 0..3 {
            ledger.append(event("gap_detected")).unwrap();
        }
        let first = ledger.verify_since(None).unwrap();
        assert_eq!(first.entries_checked, 3);

        ledger.append(event("gap_resolved")).unwrap();
        let second = ledger.verify_since(first.checkpoint.as_ref()).unwrap();
        assert!(second.is_valid);
        assert_eq!(second.entries_checked, 1);
        assert_eq!(second.from_sequence, 3);
    }

    #[test]
    fn small_page_size_still_scans_everything() {
        let config = LedgerConfig {
            page_size: 1,
            ..LedgerConfig::default()
        };
        let ledger = AuditLedger::in_memory(&config);
        for _ in 0..4 {
            ledger.append(event("gap_detected")).unwrap();
        }
        let range: Vec<_> = ledger.get_range(0, u64::MAX).unwrap().collect();
        assert_eq!(range.len(), 4);
        assert_eq!(range[0].as_ref().unwrap().previous_hash, GENESIS);
    }
}
