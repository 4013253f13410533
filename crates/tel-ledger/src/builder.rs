use chrono::{DateTime, SubsecRound, Utc};
use tel_crypto::{CanonicalBytes, ChainHasher};
use tel_types::{AuditEvent, Digest, LedgerEntry, GENESIS};

use crate::error::{LedgerError, LedgerResult};

/// Longest accepted `event_type`, in characters.
pub const MAX_EVENT_TYPE_LEN: usize = 128;
/// Longest accepted actor or resource identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Validates raw events and turns them into sealed entries.
///
/// Validation runs before any chain position is assigned, so a rejected
/// event never touches the store.
#[derive(Clone, Debug)]
pub struct EntryBuilder {
    max_payload_bytes: usize,
}

impl EntryBuilder {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Check required fields and the payload bound.
    pub fn validate(&self, event: AuditEvent) -> LedgerResult<ValidatedEvent> {
        check_event_type(event.event_type.as_str())?;
        check_identifier("actor_id", &event.actor.actor_id)?;
        check_identifier("resource_type", &event.resource.resource_type)?;
        check_identifier("resource_id", &event.resource.resource_id)?;

        let payload = CanonicalBytes::of_payload(&event.payload)?;
        if payload.len() > self.max_payload_bytes {
            return Err(LedgerError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }

        Ok(ValidatedEvent {
            event,
            payload_bytes: payload.len(),
        })
    }
}

/// An event that passed validation and only lacks a chain position.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedEvent {
    event: AuditEvent,
    payload_bytes: usize,
}

impl ValidatedEvent {
    pub fn event(&self) -> &AuditEvent {
        &self.event
    }

    /// Size of the canonical payload encoding.
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Place the event at `sequence` after `previous_hash` and compute its hash.
    ///
    /// The timestamp is truncated to microseconds, the precision it is
    /// hashed with, so the stored value re-hashes identically.
    pub fn seal(
        &self,
        sequence: u64,
        previous_hash: Digest,
        timestamp: DateTime<Utc>,
    ) -> LedgerResult<LedgerEntry> {
        let AuditEvent {
            event_type,
            actor,
            resource,
            payload,
        } = self.event.clone();
        let entry = LedgerEntry {
            sequence_number: sequence,
            timestamp: timestamp.trunc_subsecs(6),
            event_type,
            actor,
            resource,
            payload,
            entry_hash: GENESIS,
            previous_hash,
        };
        Ok(ChainHasher::seal(entry)?)
    }
}

/// Source of entry timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

fn check_event_type(value: &str) -> LedgerResult<()> {
    let len = value.chars().count();
    if len == 0 || len > MAX_EVENT_TYPE_LEN {
        return Err(LedgerError::InvalidEntry {
            field: "event_type",
            reason: format!("must be 1 to {MAX_EVENT_TYPE_LEN} characters"),
        });
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-'))
    {
        return Err(LedgerError::InvalidEntry {
            field: "event_type",
            reason: format!("character {bad:?} not allowed; use [a-z0-9_.-]"),
        });
    }
    Ok(())
}

fn check_identifier(field: &'static str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::InvalidEntry {
            field,
            reason: "must not be empty".into(),
        });
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(LedgerError::InvalidEntry {
            field,
            reason: format!("{} bytes exceeds {MAX_IDENTIFIER_LEN}", value.len()),
        });
    }
    Ok(())
}
