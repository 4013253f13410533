use tel_crypto::CanonicalError;
use tel_store::StoreError;

/// Errors produced by ledger operations.
///
/// Chain corruption is deliberately absent: it is reported as data in a
/// [`VerificationResult`](crate::VerificationResult), never as an error.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A required event field is missing or malformed. Nothing was written.
    #[error("invalid entry: {field}: {reason}")]
    InvalidEntry { field: &'static str, reason: String },

    /// The canonical payload exceeds the configured bound. Nothing was written.
    #[error("payload is {size} bytes; limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Every append attempt lost the race for the next sequence number.
    #[error("sequence conflict persisted after {attempts} attempts")]
    SequenceConflict { attempts: u32 },

    /// The store failed. The event is not recorded.
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("canonical encoding failed: {0}")]
    Canonical(#[from] CanonicalError),

    #[error("invalid sequence range: start={start}, end={end}")]
    InvalidRange { start: u64, end: u64 },

    /// Writing an export failed.
    #[error("export failed: {0}")]
    Export(#[source] std::io::Error),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidRange { start, end } => Self::InvalidRange { start, end },
            other => Self::StoreUnavailable(other),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_range_error_keeps_its_meaning() {
        let err = LedgerError::from(StoreError::InvalidRange { start: 4, end: 1 });
        assert!(matches!(err, LedgerError::InvalidRange { start: 4, end: 1 }));
    }

    #[test]
    fn io_failure_is_unavailable() {
        let io = std::io::Error::other("disk gone");
        let err = LedgerError::from(StoreError::Io(io));
        assert!(matches!(err, LedgerError::StoreUnavailable(_)));
        assert!(err.to_string().contains("disk gone"));
    }
}
