use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::TypeError;

/// Collaborator-supplied structured payload.
///
/// A `BTreeMap` so that the in-memory order already matches the sorted
/// key order of the canonical encoding.
pub type Payload = BTreeMap<String, serde_json::Value>;

/// Well-known event categories emitted by the compliance collaborators.
///
/// The taxonomy is owned by the collaborators; the ledger accepts any
/// well-formed [`EventType`], these are only shared spellings.
pub mod event_types {
    pub const ASSESSMENT_COMPLETED: &str = "assessment_completed";
    pub const GAP_DETECTED: &str = "gap_detected";
    pub const GAP_RESOLVED: &str = "gap_resolved";
    pub const CODE_GENERATED: &str = "code_generated";
    pub const REMEDIATION_APPLIED: &str = "remediation_applied";
    pub const CONFIGURATION_CHANGED: &str = "configuration_changed";
    pub const REGULATION_UPDATED: &str = "regulation_updated";
    pub const ACCESS_GRANTED: &str = "access_granted";
    pub const ACCESS_REVOKED: &str = "access_revoked";
    pub const CORRECTION_RECORDED: &str = "correction_recorded";
}

/// Event category of a ledger entry (e.g. `"assessment_completed"`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self.0)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Who performed a recorded action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    System,
    Ai,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            "ai" => Ok(Self::Ai),
            other => Err(TypeError::UnknownActorType(other.to_string())),
        }
    }
}

/// Actor attribution: `{actor_type, actor_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub actor_type: ActorType,
    pub actor_id: String,
}

impl Actor {
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
        }
    }

    pub fn user(actor_id: impl Into<String>) -> Self {
        Self::new(ActorType::User, actor_id)
    }

    pub fn system(actor_id: impl Into<String>) -> Self {
        Self::new(ActorType::System, actor_id)
    }

    pub fn ai(actor_id: impl Into<String>) -> Self {
        Self::new(ActorType::Ai, actor_id)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.actor_type, self.actor_id)
    }
}

/// The resource an event concerns: `{resource_type, resource_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: String,
    pub resource_id: String,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.resource_id)
    }
}

/// A raw compliance event as submitted by a collaborator.
///
/// Carries no position in the chain; the append coordinator assigns the
/// sequence number, timestamp, and hashes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: EventType,
    pub actor: Actor,
    pub resource: Resource,
    #[serde(default)]
    pub payload: Payload,
}

impl AuditEvent {
    pub fn new(event_type: impl Into<EventType>, actor: Actor, resource: Resource) -> Self {
        Self {
            event_type: event_type.into(),
            actor,
            resource,
            payload: Payload::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Add a single payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// One immutable, hash-linked record in an organization's ledger.
///
/// The persisted shape is flat: `actor_type`/`actor_id` and
/// `resource_type`/`resource_id` sit next to the other fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(flatten)]
    pub actor: Actor,
    #[serde(flatten)]
    pub resource: Resource,
    #[serde(default)]
    pub payload: Payload,
    pub entry_hash: Digest,
    pub previous_hash: Digest,
}

impl LedgerEntry {
    /// The event this entry recorded, without its chain position.
    pub fn event(&self) -> AuditEvent {
        AuditEvent {
            event_type: self.event_type.clone(),
            actor: self.actor.clone(),
            resource: self.resource.clone(),
            payload: self.payload.clone(),
        }
    }
}
