use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tel_ledger::LedgerError;
use tel_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid organization: {0}")]
    InvalidOrganization(#[from] TypeError),

    #[error("entry {0} not found")]
    EntryNotFound(u64),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidOrganization(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::EntryNotFound(_) => StatusCode::NOT_FOUND,
            Self::Ledger(e) => match e {
                LedgerError::InvalidEntry { .. }
                | LedgerError::InvalidRange { .. }
                | LedgerError::Canonical(_) => StatusCode::BAD_REQUEST,
                LedgerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                LedgerError::SequenceConflict { .. } => StatusCode::CONFLICT,
                LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidOrganization(_) => "invalid_organization",
            Self::EntryNotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Ledger(e) => match e {
                LedgerError::InvalidEntry { .. } => "invalid_entry",
                LedgerError::PayloadTooLarge { .. } => "payload_too_large",
                LedgerError::SequenceConflict { .. } => "sequence_conflict",
                LedgerError::StoreUnavailable(_) => "store_unavailable",
                LedgerError::Canonical(_) => "canonical_encoding",
                LedgerError::InvalidRange { .. } => "invalid_range",
                LedgerError::Export(_) => "export_failed",
            },
            Self::Io(_) | Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let body = json!({ "error": self.code(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
