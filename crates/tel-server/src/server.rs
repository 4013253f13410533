use std::sync::Arc;

use tel_ledger::LedgerRegistry;
use tel_store::{FileLedgerStore, LedgerStore};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::{build_router, AppState};

/// Ledger HTTP server.
pub struct TelServer<S: LedgerStore> {
    config: ServerConfig,
    registry: Arc<LedgerRegistry<S>>,
}

impl<S: LedgerStore + 'static> TelServer<S> {
    pub fn new(config: ServerConfig, registry: Arc<LedgerRegistry<S>>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LedgerRegistry<S>> {
        &self.registry
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState {
            registry: Arc::clone(&self.registry),
            max_page_entries: self.config.max_page_entries,
        })
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            data_dir = %self.config.ledger.data_dir.display(),
            "tel server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

impl TelServer<FileLedgerStore> {
    /// Server over per-organization segment files under `config.ledger.data_dir`.
    pub fn file_backed(config: ServerConfig) -> Self {
        let registry = Arc::new(LedgerRegistry::file_backed(config.ledger.clone()));
        Self::new(config, registry)
    }
}
