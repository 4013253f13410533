use std::collections::VecDeque;
use std::iter::FusedIterator;

use tel_types::LedgerEntry;

use crate::error::StoreResult;
use crate::traits::LedgerStore;

/// Entries fetched per `read_page` call when no page size is given.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Lazy, finite, restartable ascending scan over a range of store keys.
///
/// Holds at most one page of entries in memory. Gaps in the stored
/// sequence are not filled in; the scan simply yields what is stored.
/// Paging advances by store key, so an entry whose own `sequence_number`
/// was altered can neither rewind nor skip the scan.
/// After a read error the iterator yields that error once and then ends.
pub struct EntryRange<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    start: u64,
    end: u64,
    page_size: usize,
    cursor: u64,
    buffer: VecDeque<(u64, LedgerEntry)>,
    exhausted: bool,
}

impl<'a, S: LedgerStore + ?Sized> EntryRange<'a, S> {
    pub fn new(store: &'a S, start: u64, end: u64, page_size: usize) -> Self {
        Self {
            store,
            start,
            end,
            page_size: page_size.max(1),
            cursor: start,
            buffer: VecDeque::new(),
            exhausted: start >= end,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Rewind to the beginning of the range.
    pub fn restart(&mut self) {
        self.cursor = self.start;
        self.buffer.clear();
        self.exhausted = self.start >= self.end;
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Yield `(key, entry)` pairs instead of bare entries.
    pub fn keyed(self) -> Keyed<'a, S> {
        Keyed(self)
    }

    fn fill(&mut self) -> StoreResult<()> {
        let page = self.store.read_page(self.cursor, self.end, self.page_size)?;
        let next = page.last().and_then(|(key, _)| key.checked_add(1));
        match next {
            Some(next) if page.len() == self.page_size && next > self.cursor => {
                self.cursor = next;
            }
            _ => self.exhausted = true,
        }
        self.buffer.extend(page);
        Ok(())
    }

    fn next_keyed(&mut self) -> Option<StoreResult<(u64, LedgerEntry)>> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl<S: LedgerStore + ?Sized> Iterator for EntryRange<'_, S> {
    type Item = StoreResult<LedgerEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_keyed().map(|item| item.map(|(_, entry)| entry))
    }
}

impl<S: LedgerStore + ?Sized> FusedIterator for EntryRange<'_, S> {}

/// [`EntryRange`] yielding each entry with the key it is stored under.
pub struct Keyed<'a, S: LedgerStore + ?Sized>(EntryRange<'a, S>);

impl<S: LedgerStore + ?Sized> Iterator for Keyed<'_, S> {
    type Item = StoreResult<(u64, LedgerEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_keyed()
    }
}

impl<S: LedgerStore + ?Sized> FusedIterator for Keyed<'_, S> {}

impl<S: LedgerStore + ?Sized> Clone for EntryRange<'_, S> {
    /// A clone starts over from the beginning of the range.
    fn clone(&self) -> Self {
        Self::new(self.store, self.start, self.end, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedgerStore;
    use crate::memory::tests::{append_chain, renumber, sequences};

    #[test]
    fn pages_through_whole_range() {
        let store = InMemoryLedgerStore::new();
        append_chain(&store, 10);

        let range = EntryRange::new(&store, 0, u64::MAX, 3);
        let seqs: Vec<u64> = range.map(|r| r.unwrap().sequence_number).collect();
        assert_eq!(seqs, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn end_is_exclusive() {
        let store = InMemoryLedgerStore::new();
        append_chain(&store, 10);
        assert_eq!(sequences(store.get_range(2, 5)), vec![2, 3, 4]);
    }

    #[test]
    fn empty_range_yields_nothing() {
        let store = InMemoryLedgerStore::new();
        append_chain(&store, 3);
        assert!(sequences(store.get_range(2, 2)).is_empty());
        assert!(sequences(store.get_range(7, 9)).is_empty());
    }

    #[test]
    fn restart_replays_from_start() {
        let store = InMemoryLedgerStore::new();
        append_chain(&store, 4);

        let mut range = store.get_range(1, 4).with_page_size(2);
        assert_eq!(range.next().unwrap().unwrap().sequence_number, 1);
        assert_eq!(range.next().unwrap().unwrap().sequence_number, 2);
        range.restart();
        assert_eq!(sequences(range.clone()), vec![1, 2, 3]);
        assert_eq!(sequences(range), vec![1, 2, 3]);
    }

    #[test]
    fn altered_sequence_field_does_not_rewind_paging() {
        let store = InMemoryLedgerStore::new();
        append_chain(&store, 6);
        renumber(&store, 3, 1);

        let fields = sequences(EntryRange::new(&store, 0, 6, 2).take(50));
        assert_eq!(fields, vec![0, 1, 2, 1, 4, 5]);

        let keys: Vec<u64> = EntryRange::new(&store, 0, 6, 2)
            .keyed()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn altered_sequence_field_does_not_skip_entries() {
        let store = InMemoryLedgerStore::new();
        append_chain(&store, 6);
        renumber(&store, 1, 40);

        let keys: Vec<u64> = store
            .get_range(0, u64::MAX)
            .with_page_size(2)
            .keyed()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn range_is_lazy_about_later_appends() {
        let store = InMemoryLedgerStore::new();
        append_chain(&store, 2);
        let range = store.get_range(0, 2);
        append_chain(&store, 2);
        assert_eq!(sequences(range), vec![0, 1]);
    }
}
