//! Service configuration.
//!
//! Values are layered with `figment`, later layers winning:
//!
//! 1. [`ServiceConfig::default`] (the docker-compose endpoints)
//! 2. an optional TOML file
//! 3. `FILE_ANALYTICS_*` environment variables, `__` separating nested keys
//!    (e.g. `FILE_ANALYTICS_DOCUMENT__URI=mongodb://localhost:27017/`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::storage::mongo::DocumentStoreConfig;
use crate::storage::opensearch::SearchIndexConfig;
use crate::storage::postgres::SecondaryStoreConfig;
use crate::storage::BackendKind;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FILE_ANALYTICS_";

fn default_connect_timeout_ms() -> u64 {
    2_000
}

/// Everything needed to wire an [`crate::service::Ingestor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceConfig {
    /// SQLite database file of the primary store.
    pub database_path: PathBuf,
    /// Directory raw uploads are copied to; `None` disables it.
    pub upload_dir: Option<PathBuf>,
    /// Connect timeout for optional backends, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Optional backends to wire. Backends not listed behave as not configured.
    #[serde(default)]
    pub optional_backends: Vec<BackendKind>,
    /// Document store settings.
    #[serde(default)]
    pub document: DocumentStoreConfig,
    /// Search index settings.
    #[serde(default)]
    pub search: SearchIndexConfig,
    /// Secondary relational store settings.
    #[serde(default)]
    pub secondary: SecondaryStoreConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data_files.db"),
            upload_dir: Some(PathBuf::from("uploads")),
            connect_timeout_ms: default_connect_timeout_ms(),
            optional_backends: BackendKind::OPTIONAL.to_vec(),
            document: DocumentStoreConfig::default(),
            search: SearchIndexConfig::default(),
            secondary: SecondaryStoreConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load defaults, then `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The layered provider behind [`Self::load`].
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Connect timeout for optional backends.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Whether `backend` should be wired.
    pub fn is_enabled(&self, backend: BackendKind) -> bool {
        backend == BackendKind::Primary || self.optional_backends.contains(&backend)
    }
}
