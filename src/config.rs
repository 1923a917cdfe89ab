//! Prioritizer configuration file (JSON).
//!
//! Every field is optional; CLI flags override file values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::Caps;
use crate::store::SqliteSessionStore;
use crate::universe::{CandidateUniverse, UniverseError};

pub const DEFAULT_METHOD_NAME: &str = "values";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("universe error: {0}")]
    Universe(#[from] UniverseError),
    #[error("invalid caps: {0}")]
    Caps(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrioritizerConfig {
    /// Shortlist cap (K₁).
    #[serde(default)]
    pub selection_cap: Option<usize>,
    /// Final-set cap (K₂).
    #[serde(default)]
    pub reduction_cap: Option<usize>,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// JSON array or one-item-per-line file. Built-in values when absent.
    #[serde(default)]
    pub universe_path: Option<PathBuf>,
    #[serde(default)]
    pub method: Option<String>,
}

impl PrioritizerConfig {
    pub fn caps(&self) -> Caps {
        let defaults = Caps::default();
        Caps::new(
            self.selection_cap.unwrap_or(defaults.selection),
            self.reduction_cap.unwrap_or(defaults.reduction),
        )
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(SqliteSessionStore::default_path)
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or(DEFAULT_METHOD_NAME)
    }

    /// Load the universe and check the caps fit it.
    pub fn resolve(&self) -> Result<(Arc<CandidateUniverse>, Caps), ConfigError> {
        let universe = match &self.universe_path {
            Some(path) => CandidateUniverse::from_path(path)?,
            None => CandidateUniverse::default_values(),
        };
        let caps = self.caps();
        caps.validate(universe.len()).map_err(ConfigError::Caps)?;
        Ok((Arc::new(universe), caps))
    }
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<PrioritizerConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
