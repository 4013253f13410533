use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tel_store::{SyncMode, DEFAULT_PAGE_SIZE};
use tel_types::OrganizationId;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Ledger tuning knobs. Every field has a default, so an empty TOML
/// document is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Root directory holding one sub-directory per organization.
    pub data_dir: PathBuf,
    /// Upper bound on the canonical payload encoding, in bytes.
    pub max_payload_bytes: usize,
    /// Conflict retries before an append gives up.
    pub max_append_retries: u32,
    /// Entries fetched per store read while scanning.
    pub page_size: usize,
    pub sync: SyncMode,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("tel-data"),
            max_payload_bytes: 64 * 1024,
            max_append_retries: 8,
            page_size: DEFAULT_PAGE_SIZE,
            sync: SyncMode::EveryWrite,
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Segment file of `org`'s ledger under `data_dir`.
    pub fn segment_path(&self, org: &OrganizationId) -> PathBuf {
        self.data_dir.join(org.as_str()).join("ledger.seg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = LedgerConfig::default();
        assert_eq!(c.max_payload_bytes, 65_536);
        assert_eq!(c.max_append_retries, 8);
        assert_eq!(c.page_size, 256);
        assert_eq!(c.sync, SyncMode::EveryWrite);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(LedgerConfig::from_toml_str("").unwrap(), LedgerConfig::default());
    }

    #[test]
    fn partial_document_overrides() {
        let c = LedgerConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/tel"
            max_payload_bytes = 1024
            sync = "os_default"
            "#,
        )
        .unwrap();
        assert_eq!(c.data_dir, PathBuf::from("/var/lib/tel"));
        assert_eq!(c.max_payload_bytes, 1024);
        assert_eq!(c.sync, SyncMode::OsDefault);
        assert_eq!(c.max_append_retries, 8);
    }

    #[test]
    fn unknown_sync_mode_is_rejected() {
        assert!(matches!(
            LedgerConfig::from_toml_str(r#"sync = "sometimes""#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn segment_path_is_per_organization() {
        let c = LedgerConfig {
            data_dir: PathBuf::from("/data"),
            ..LedgerConfig::default()
        };
        let org: OrganizationId = "acme".parse().unwrap();
        assert_eq!(c.segment_path(&org), PathBuf::from("/data/acme/ledger.seg"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = LedgerConfig::load(Path::new("/nonexistent/tel.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tel.toml"));
    }
}
