use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid organization id {0:?}: expected 1-64 chars of [a-z0-9_-]")]
    InvalidOrganizationId(String),

    #[error("unknown actor type: {0}")]
    UnknownActorType(String),
}
