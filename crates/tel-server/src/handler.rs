use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;
use tel_ledger::{AuditLedger, EntryFilter, VerificationResult};
use tel_store::LedgerStore;
use tel_types::{ActorType, AuditEvent, ChainState, Digest, EventType, LedgerEntry, OrganizationId, GENESIS};

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

/// Entries returned by a list request when no `limit` is given.
pub const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub limit: Option<usize>,
    pub event_type: Option<EventType>,
    pub actor_type: Option<ActorType>,
    pub actor_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

impl ListParams {
    fn filter(&self) -> EntryFilter {
        EntryFilter {
            event_type: self.event_type.clone(),
            actor_type: self.actor_type,
            actor_id: self.actor_id.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.clone(),
            ..EntryFilter::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyParams {
    pub from: Option<u64>,
    pub previous_hash: Option<Digest>,
}

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "tel-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Organizations whose ledger is currently open.
pub async fn list_organizations<S: LedgerStore + 'static>(
    State(state): State<AppState<S>>,
) -> Json<Vec<OrganizationId>> {
    Json(state.registry.organizations())
}

pub async fn append_entry<S: LedgerStore + 'static>(
    State(state): State<AppState<S>>,
    Path(org): Path<String>,
    Json(event): Json<AuditEvent>,
) -> ServerResult<(StatusCode, Json<LedgerEntry>)> {
    let entry = with_ledger(&state, &org, move |ledger| Ok(ledger.append(event)?)).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_entries<S: LedgerStore + 'static>(
    State(state): State<AppState<S>>,
    Path(org): Path<String>,
    Query(params): Query<ListParams>,
) -> ServerResult<Json<Vec<LedgerEntry>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(state.max_page_entries);
    let entries = with_ledger(&state, &org, move |ledger| {
        let start = params.start.unwrap_or(0);
        let end = params.end.unwrap_or(u64::MAX);
        Ok(ledger.query(start, end, &params.filter(), limit)?)
    })
    .await?;
    Ok(Json(entries))
}

pub async fn get_entry<S: LedgerStore + 'static>(
    State(state): State<AppState<S>>,
    Path((org, sequence)): Path<(String, u64)>,
) -> ServerResult<Json<LedgerEntry>> {
    let entry = with_ledger(&state, &org, move |ledger| Ok(ledger.get_entry(sequence)?)).await?;
    entry.map(Json).ok_or(ServerError::EntryNotFound(sequence))
}

/// Current chain tip, `null` for an empty ledger.
pub async fn head<S: LedgerStore + 'static>(
    State(state): State<AppState<S>>,
    Path(org): Path<String>,
) -> ServerResult<Json<Option<ChainState>>> {
    let tip = with_ledger(&state, &org, |ledger| Ok(ledger.head()?)).await?;
    Ok(Json(tip))
}

/// Full verification, or incremental with `?from=k&previous_hash=h`.
pub async fn verify<S: LedgerStore + 'static>(
    State(state): State<AppState<S>>,
    Path(org): Path<String>,
    Query(params): Query<VerifyParams>,
) -> ServerResult<Json<VerificationResult>> {
    let result = with_ledger(&state, &org, move |ledger| match (params.from, params.previous_hash) {
        (None, None) => Ok(ledger.full_verify()?),
        (Some(from), Some(hash)) => Ok(ledger.incremental_verify(from, hash)?),
        (Some(0), None) => Ok(ledger.incremental_verify(0, GENESIS)?),
        (Some(_), None) => Err(ServerError::BadRequest(
            "`from` after 0 requires `previous_hash`".into(),
        )),
        (None, Some(_)) => Err(ServerError::BadRequest(
            "`previous_hash` requires `from`".into(),
        )),
    })
    .await?;
    Ok(Json(result))
}

/// Resolve `org` and run `f` against its ledger on the blocking pool.
///
/// Store I/O and fsync are synchronous, so they must not run on the
/// async workers.
async fn with_ledger<S, T, F>(state: &AppState<S>, org: &str, f: F) -> ServerResult<T>
where
    S: LedgerStore + 'static,
    T: Send + 'static,
    F: FnOnce(&AuditLedger<S>) -> ServerResult<T> + Send + 'static,
{
    let org: OrganizationId = org.parse()?;
    let registry = Arc::clone(&state.registry);
    tokio::task::spawn_blocking(move || {
        let ledger = registry.ledger(&org)?;
        f(&ledger)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("ledger task failed: {e}")))?
}
