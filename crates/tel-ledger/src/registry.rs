use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tel_store::{FileLedgerStore, InMemoryLedgerStore, LedgerStore};
use tel_types::OrganizationId;
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::ledger::AuditLedger;

type StoreFactory<S> = dyn Fn(&OrganizationId, &LedgerConfig) -> LedgerResult<S> + Send + Sync;

/// Lazily opened ledgers, one per organization.
///
/// Each ledger has its own store and append lock, so organizations never
/// contend with each other once their ledger is open. Opening a store runs
/// outside the map lock; only concurrent opens of the same organization
/// wait for each other.
pub struct LedgerRegistry<S: LedgerStore> {
    config: LedgerConfig,
    factory: Box<StoreFactory<S>>,
    ledgers: RwLock<HashMap<OrganizationId, Arc<AuditLedger<S>>>>,
    opening: Mutex<HashMap<OrganizationId, Arc<Mutex<()>>>>,
}

impl<S: LedgerStore> LedgerRegistry<S> {
    pub fn new<F>(config: LedgerConfig, factory: F) -> Self
    where
        F: Fn(&OrganizationId, &LedgerConfig) -> LedgerResult<S> + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Box::new(factory),
            ledgers: RwLock::new(HashMap::new()),
            opening: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The ledger for `org`, opening it on first use.
    pub fn ledger(&self, org: &OrganizationId) -> LedgerResult<Arc<AuditLedger<S>>> {
        if let Some(ledger) = self.get(org) {
            return Ok(ledger);
        }

        let gate = self
            .opening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(org.clone())
            .or_default()
            .clone();
        let _opening = gate.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ledger) = self.get(org) {
            return Ok(ledger);
        }

        let store = (self.factory)(org, &self.config)?;
        let ledger = Arc::new(AuditLedger::new(store, &self.config));
        let ledger = self
            .ledgers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(org.clone())
            .or_insert(ledger)
            .clone();
        info!(org = %org, "opened organization ledger");
        Ok(ledger)
    }

    /// The ledger for `org` if it is already open.
    pub fn get(&self, org: &OrganizationId) -> Option<Arc<AuditLedger<S>>> {
        self.ledgers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(org)
            .cloned()
    }

    /// Organizations with an open ledger, sorted.
    pub fn organizations(&self) -> Vec<OrganizationId> {
        let mut orgs: Vec<_> = self
            .ledgers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        orgs.sort();
        orgs
    }
}

impl LedgerRegistry<FileLedgerStore> {
    /// One segment file per organization under `config.data_dir`.
    pub fn file_backed(config: LedgerConfig) -> Self {
        Self::new(config, |org, config| {
            let store = FileLedgerStore::open(config.segment_path(org), config.sync)?;
            let report = store.recovery_report();
            if !report.is_clean() {
                warn!(
                    org = %org,
                    skipped = report.skipped.len(),
                    truncated_bytes = report.truncated_bytes,
                    "ledger segment needed recovery; run verification"
                );
            }
            Ok(store)
        })
    }
}

impl LedgerRegistry<InMemoryLedgerStore> {
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(config, |_, _| Ok(InMemoryLedgerStore::new()))
    }
}
