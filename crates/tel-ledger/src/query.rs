use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tel_store::{EntryRange, LedgerStore};
use tel_types::{ActorType, EventType, LedgerEntry};
use tracing::info;

use crate::error::{LedgerError, LedgerResult};

/// Read-side filter. Unset fields match everything; set fields are ANDed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryFilter {
    pub event_type: Option<EventType>,
    pub actor_type: Option<ActorType>,
    pub actor_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Inclusive lower timestamp bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper timestamp bound.
    pub until: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<EventType>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn actor(mut self, actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        self.actor_type = Some(actor_type);
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        fn eq<T: PartialEq + ?Sized>(want: Option<&T>, have: &T) -> bool {
            want.map_or(true, |w| w == have)
        }

        eq(self.event_type.as_ref(), &entry.event_type)
            && eq(self.actor_type.as_ref(), &entry.actor.actor_type)
            && eq(self.actor_id.as_deref(), entry.actor.actor_id.as_str())
            && eq(self.resource_type.as_deref(), entry.resource.resource_type.as_str())
            && eq(self.resource_id.as_deref(), entry.resource.resource_id.as_str())
            && self.since.map_or(true, |t| entry.timestamp >= t)
            && self.until.map_or(true, |t| entry.timestamp < t)
    }
}

/// Collect up to `limit` entries in `start..end` that match `filter`.
///
/// Streams through the range one page at a time; only matches are kept.
pub fn query<S: LedgerStore + ?Sized>(
    store: &S,
    start: u64,
    end: u64,
    filter: &EntryFilter,
    limit: usize,
    page_size: usize,
) -> LedgerResult<Vec<LedgerEntry>> {
    check_range(start, end)?;
    let mut found = Vec::new();
    if limit == 0 {
        return Ok(found);
    }
    for entry in EntryRange::new(store, start, end, page_size) {
        let entry = entry?;
        if filter.matches(&entry) {
            found.push(entry);
            if found.len() == limit {
                break;
            }
        }
    }
    Ok(found)
}

/// Write `start..end` as JSON lines. Returns the number of entries written.
pub fn export_jsonl<S: LedgerStore + ?Sized, W: Write>(
    store: &S,
    writer: &mut W,
    start: u64,
    end: u64,
    page_size: usize,
) -> LedgerResult<u64> {
    check_range(start, end)?;
    let mut written = 0u64;
    for entry in EntryRange::new(store, start, end, page_size) {
        let entry = entry?;
        serde_json::to_writer(&mut *writer, &entry)
            .map_err(|e| LedgerError::Export(e.into()))?;
        writer.write_all(b"\n").map_err(LedgerError::Export)?;
        written += 1;
    }
    writer.flush().map_err(LedgerError::Export)?;
    info!(start, end, written, "exported entries");
    Ok(written)
}

pub(crate) fn check_range(start: u64, end: u64) -> LedgerResult<()> {
    if start > end {
        return Err(LedgerError::InvalidRange { start, end });
    }
    Ok(())
}
