//! Canonical byte encoding of ledger entries.
//!
//! Entries are hashed over an RFC 8785 (JCS) rendering of their fields:
//! sorted keys, compact separators, ECMAScript number formatting. Two
//! logically identical entries always produce identical bytes, and an
//! entry read back from storage re-encodes to the bytes it was sealed
//! with.
//!
//! The canonical document is flat:
//!
//! ```text
//! {"actor_id","actor_type","event_type","payload",
//!  "resource_id","resource_type","sequence_number","timestamp"}
//! ```
//!
//! `entry_hash` and `previous_hash` are not part of the document; the
//! previous hash is prepended by [`crate::ChainHasher`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use tel_types::{ActorType, LedgerEntry, Payload};

/// Bytes produced exclusively by JCS canonicalization.
///
/// The inner buffer is private so the only way to obtain hashable bytes
/// is through [`CanonicalBytes::new`] or [`CanonicalBytes::of_entry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    pub fn new(value: &impl Serialize) -> Result<Self, CanonicalError> {
        let s = serde_jcs::to_string(value)
            .map_err(|e| CanonicalError::Serialization(e.to_string()))?;
        Ok(Self(s.into_bytes()))
    }

    /// Canonical document of an entry, excluding both hash fields.
    pub fn of_entry(entry: &LedgerEntry) -> Result<Self, CanonicalError> {
        Self::new(&EntryDocument::from(entry))
    }

    /// Canonical bytes of a payload alone, used for the size bound.
    pub fn of_payload(payload: &Payload) -> Result<Self, CanonicalError> {
        Self::new(payload)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Errors from canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalError {
    #[error("canonical serialization failed: {0}")]
    Serialization(String),
}

/// Render a timestamp the one way it is ever hashed: UTC RFC 3339 with
/// exactly six fractional digits and a `Z` suffix.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Serialize)]
struct EntryDocument<'a> {
    actor_id: &'a str,
    actor_type: ActorType,
    event_type: &'a str,
    payload: &'a Payload,
    resource_id: &'a str,
    resource_type: &'a str,
    sequence_number: u64,
    timestamp: String,
}

impl<'a> From<&'a LedgerEntry> for EntryDocument<'a> {
    fn from(entry: &'a LedgerEntry) -> Self {
        Self {
            actor_id: &entry.actor.actor_id,
            actor_type: entry.actor.actor_type,
            event_type: entry.event_type.as_str(),
            payload: &entry.payload,
            resource_id: &entry.resource.resource_id,
            resource_type: &entry.resource.resource_type,
            sequence_number: entry.sequence_number,
            timestamp: format_timestamp(&entry.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use tel_types::{Actor, EventType, Resource, GENESIS};

    fn entry_with(payload: Payload) -> LedgerEntry {
        LedgerEntry {
            sequence_number: 7,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap(),
            event_type: EventType::new("gap_resolved"),
            actor: Actor::user("alice"),
            resource: Resource::new("gap", "G-17"),
            payload,
            entry_hash: GENESIS,
            previous_hash: GENESIS,
        }
    }

    #[test]
    fn entry_document_is_sorted_and_compact() {
        let mut payload = Payload::new();
        payload.insert("z".into(), json!(1));
        payload.insert("a".into(), json!({"y": true, "b": null}));
        let bytes = CanonicalBytes::of_entry(&entry_with(payload)).unwrap();
        let s = std::str::from_utf8(bytes.as_bytes()).unwrap();
        assert_eq!(
            s,
            r#"{"actor_id":"alice","actor_type":"user","event_type":"gap_resolved","payload":{"a":{"b":null,"y":true},"z":1},"resource_id":"G-17","resource_type":"gap","sequence_number":7,"timestamp":"2024-03-09T08:30:00.000000Z"}"#
        );
    }

    #[test]
    fn hash_fields_are_excluded() {
        let mut a = entry_with(Payload::new());
        let b = a.clone();
        a.entry_hash = tel_types::Digest::from_bytes([5; 32]);
        a.previous_hash = tel_types::Digest::from_bytes([6; 32]);
        assert_eq!(
            CanonicalBytes::of_entry(&a).unwrap(),
            CanonicalBytes::of_entry(&b).unwrap()
        );
    }

    #[test]
    fn timestamp_has_fixed_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 120_000).unwrap();
        assert_eq!(format_timestamp(&ts), "2023-11-14T22:13:20.000120Z");
    }

    #[test]
    fn nested_object_key_order_does_not_matter() {
        let first: Value = serde_json::from_str(r#"{"b":1,"a":{"d":2,"c":3}}"#).unwrap();
        let second: Value = serde_json::from_str(r#"{"a":{"c":3,"d":2},"b":1}"#).unwrap();
        assert_eq!(
            CanonicalBytes::new(&first).unwrap(),
            CanonicalBytes::new(&second).unwrap()
        );
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            (-1.0e12f64..1.0e12f64).prop_map(Value::from),
            "[a-zA-Z0-9 _\\-\u{e9}\u{4e2d}]{0,16}".prop_map(Value::from),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        json_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonical_bytes_survive_storage_roundtrip(
            payload in prop::collection::btree_map("[a-z_]{1,8}", json_value(), 0..6)
        ) {
            let original = entry_with(payload);
            let stored = serde_json::to_vec(&original).unwrap();
            let reloaded: LedgerEntry = serde_json::from_slice(&stored).unwrap();
            prop_assert_eq!(
                CanonicalBytes::of_entry(&original).unwrap(),
                CanonicalBytes::of_entry(&reloaded).unwrap()
            );
        }
    }
}
