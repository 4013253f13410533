use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tel_ledger::LedgerRegistry;
use tel_store::LedgerStore;
use tower_http::trace::TraceLayer;

use crate::handler;

/// Shared handler state.
pub struct AppState<S: LedgerStore> {
    pub registry: Arc<LedgerRegistry<S>>,
    pub max_page_entries: usize,
}

impl<S: LedgerStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            max_page_entries: self.max_page_entries,
        }
    }
}

/// Build the axum router with all ledger endpoints.
pub fn build_router<S: LedgerStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/orgs", get(handler::list_organizations::<S>))
        .route(
            "/v1/orgs/:org/entries",
            get(handler::list_entries::<S>).post(handler::append_entry::<S>),
        )
        .route("/v1/orgs/:org/entries/:seq", get(handler::get_entry::<S>))
        .route("/v1/orgs/:org/head", get(handler::head::<S>))
        .route("/v1/orgs/:org/verify", get(handler::verify::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
