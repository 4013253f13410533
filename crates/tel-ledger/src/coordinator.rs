use std::sync::{Arc, Mutex, PoisonError};

use tel_store::LedgerStore;
use tel_types::{next_link, AuditEvent, ChainState, LedgerEntry};
use tracing::{debug, warn};

use crate::builder::{Clock, EntryBuilder, SystemClock};
use crate::error::{LedgerError, LedgerResult};

/// Cached view of the chain tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tip {
    /// Must be re-read from the store before the next append.
    Unknown,
    /// `None` is a known-empty ledger.
    Known(Option<ChainState>),
}

/// Serializes appends to one ledger into a single global order.
///
/// Reading the tip, sealing the entry against it, persisting it, and
/// advancing the tip all happen while holding one mutex. The cached tip is
/// only a shortcut: it is rebuilt from the store's last entry whenever it
/// is unknown or a conflict shows it is stale. Conflicts come from other
/// writers sharing the same store and are retried transparently.
pub struct AppendCoordinator<S: LedgerStore> {
    store: Arc<S>,
    builder: EntryBuilder,
    clock: Box<dyn Clock>,
    max_retries: u32,
    tip: Mutex<Tip>,
}

impl<S: LedgerStore> AppendCoordinator<S> {
    pub fn new(store: Arc<S>, builder: EntryBuilder, max_retries: u32) -> Self {
        Self {
            store,
            builder,
            clock: Box::new(SystemClock),
            max_retries,
            tip: Mutex::new(Tip::Unknown),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Record `event` as the next entry and return it.
    ///
    /// Invalid events fail before the append lock is taken. On
    /// [`LedgerError::StoreUnavailable`] the event is not recorded.
    pub fn append(&self, event: AuditEvent) -> LedgerResult<LedgerEntry> {
        let validated = self.builder.validate(event)?;

        // A panic while holding the lock leaves the tip suspect, never wrong
        // in a way the store cannot correct.
        let mut tip = self.tip.lock().unwrap_or_else(|poison| {
            let mut guard = poison.into_inner();
            *guard = Tip::Unknown;
            guard
        });

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let state = match *tip {
                Tip::Known(state) => state,
                Tip::Unknown => {
                    let state = self.load_tip()?;
                    *tip = Tip::Known(state);
                    state
                }
            };

            let (sequence, previous_hash) = next_link(state.as_ref());
            let entry = validated.seal(sequence, previous_hash, self.clock.now())?;

            match self.store.append_if_next(&entry, sequence) {
                Ok(()) => {
                    *tip = Tip::Known(Some(ChainState::of(&entry)));
                    debug!(
                        sequence,
                        event_type = %entry.event_type,
                        hash = %entry.entry_hash.short_hex(),
                        "entry appended"
                    );
                    return Ok(entry);
                }
                Err(e) if e.is_conflict() => {
                    *tip = Tip::Unknown;
                    if attempt > self.max_retries {
                        warn!(sequence, attempts = attempt, "append retries exhausted");
                        return Err(LedgerError::SequenceConflict { attempts: attempt });
                    }
                    warn!(sequence, attempt, error = %e, "sequence conflict; refreshing chain tip");
                }
                Err(e) => {
                    *tip = Tip::Unknown;
                    warn!(sequence, error = %e, "store rejected append; event not recorded");
                    return Err(LedgerError::StoreUnavailable(e));
                }
            }
        }
    }

    /// The cached tip, if it is currently known.
    pub fn cached_tip(&self) -> Option<Option<ChainState>> {
        match *self.tip.lock().unwrap_or_else(PoisonError::into_inner) {
            Tip::Known(state) => Some(state),
            Tip::Unknown => None,
        }
    }

    /// Drop the cached tip so the next append rebuilds it from the store.
    pub fn invalidate(&self) {
        *self.tip.lock().unwrap_or_else(PoisonError::into_inner) = Tip::Unknown;
    }

    fn load_tip(&self) -> LedgerResult<Option<ChainState>> {
        match self.store.get_tail() {
            Ok(tail) => Ok(tail),
            Err(e) => {
                warn!(error = %e, "cannot read chain tip from store");
                Err(LedgerError::StoreUnavailable(e))
            }
        }
    }
}

impl<S: LedgerStore> std::fmt::Debug for AppendCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendCoordinator")
            .field("builder", &self.builder)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tel_crypto::ChainHasher;
    use tel_store::{InMemoryLedgerStore, StoreError};
    use tel_types::{Actor, Resource, GENESIS};

    fn coordinator(store: Arc<InMemoryLedgerStore>) -> AppendCoordinator<InMemoryLedgerStore> {
        AppendCoordinator::new(store, EntryBuilder::new(64 * 1024), 8)
    }

    fn event(n: u64) -> AuditEvent {
        AuditEvent::new("gap_detected", Actor::ai("mapper"), Resource::new("repository", "repoA"))
            .with_field("n", n)
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let c = coordinator(Arc::new(InMemoryLedgerStore::new()));
        let entry = c.append(event(0)).unwrap();
        assert_eq!(entry.sequence_number, 0);
        assert_eq!(entry.previous_hash, GENESIS);
        assert!(ChainHasher::verify(&entry).unwrap());
    }

    #[test]
    fn entries_link_in_order() {
        let c = coordinator(Arc::new(InMemoryLedgerStore::new()));
        let a = c.append(event(0)).unwrap();
        let b = c.append(event(1)).unwrap();
        assert_eq!(b.sequence_number, 1);
        assert_eq!(b.previous_hash, a.entry_hash);
        assert_eq!(c.cached_tip(), Some(Some(ChainState::of(&b))));
    }

    #[test]
    fn tip_is_rebuilt_from_store_after_restart() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let last = {
            let c = coordinator(store.clone());
            c.append(event(0)).unwrap();
            c.append(event(1)).unwrap()
        };

        let restarted = coordinator(store);
        assert_eq!(restarted.cached_tip(), None);
        let next = restarted.append(event(2)).unwrap();
        assert_eq!(next.sequence_number, 2);
        assert_eq!(next.previous_hash, last.entry_hash);
    }

    #[test]
    fn invalid_event_never_reaches_store() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let c = coordinator(store.clone());
        let mut bad = event(0);
        bad.event_type = "".into();
        assert!(matches!(c.append(bad), Err(LedgerError::InvalidEntry { .. })));
        assert_eq!(store.entry_count().unwrap(), 0);
        assert_eq!(c.cached_tip(), None);
    }

    #[test]
    fn stale_tip_is_refreshed_transparently() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let a = coordinator(store.clone());
        let b = coordinator(store.clone());

        a.append(event(0)).unwrap();
        b.append(event(1)).unwrap();
        // `a` still believes the tip is sequence 0.
        let entry = a.append(event(2)).unwrap();
        assert_eq!(entry.sequence_number, 2);
        assert_eq!(store.entry_count().unwrap(), 3);
    }

    #[test]
    fn zero_retries_surfaces_conflict() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let a = AppendCoordinator::new(store.clone(), EntryBuilder::new(1024), 0);
        let b = coordinator(store.clone());

        a.append(event(0)).unwrap();
        b.append(event(1)).unwrap();
        assert!(matches!(
            a.append(event(2)),
            Err(LedgerError::SequenceConflict { attempts: 1 })
        ));
        // The failed attempt discarded the stale tip.
        assert_eq!(a.append(event(3)).unwrap().sequence_number, 2);
    }

    #[test]
    fn store_failure_is_fatal_and_resets_tip() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let c = coordinator(store.clone());
        c.append(event(0)).unwrap();

        store.fail_next_writes(1);
        let err = c.append(event(1)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::StoreUnavailable(StoreError::Unavailable(_))
        ));
        assert_eq!(c.cached_tip(), None);
        assert_eq!(store.entry_count().unwrap(), 1);

        assert_eq!(c.append(event(1)).unwrap().sequence_number, 1);
    }
}
