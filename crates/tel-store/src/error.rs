/// Errors from ledger store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The target sequence is not the next free position (a lost race).
    #[error("append at sequence {attempted} rejected: next free sequence is {next_free}")]
    SequenceConflict { attempted: u64, next_free: u64 },

    /// The entry's `previous_hash` does not match the stored tail.
    #[error("append at sequence {sequence} rejected: previous hash does not match stored tail")]
    StaleLink { sequence: u64 },

    /// The entry's own sequence number disagrees with the requested slot.
    #[error("entry carries sequence {entry} but was offered for slot {slot}")]
    MismatchedSequence { entry: u64, slot: u64 },

    #[error("invalid sequence range: start={start}, end={end}")]
    InvalidRange { start: u64, end: u64 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The segment cannot be read past a damaged record header.
    #[error("corrupt segment at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// The backend refuses writes (failed fsync, poisoned lock, injected fault).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Conflicts are resolved by re-reading the tail and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::SequenceConflict { .. } | Self::StaleLink { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn poisoned(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} lock poisoned"))
}
