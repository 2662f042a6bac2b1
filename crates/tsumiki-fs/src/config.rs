//! Filesystem configuration, loaded from TOML.
//!
//! ```toml
//! backend = "sqlite"
//! path = "/var/lib/tsumiki/fs.db"
//! root = "home/alice"   # optional
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backends::{MemFs, SqlFs};
use crate::ops::Fs;
use crate::sub::SubFs;

/// Where the filesystem keeps its nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Backend {
    /// Process memory; nothing survives the process.
    Memory,
    /// A SQLite database file, created if missing.
    Sqlite { path: PathBuf },
}

/// Filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub backend: Backend,

    /// Expose only this directory of the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            root: None,
        }
    }
}

/// Error type for config operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to open filesystem: {0}")]
    Fs(#[from] tsumiki_io::Error),
}

impl Config {
    /// A SQLite-backed configuration.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Sqlite { path: path.into() },
            root: None,
        }
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Build the configured filesystem.
    pub fn open(&self) -> Result<Arc<dyn Fs>, ConfigError> {
        let fs: Arc<dyn Fs> = match &self.backend {
            Backend::Memory => Arc::new(MemFs::new()),
            Backend::Sqlite { path } => {
                tracing::info!(path = %path.display(), "opening sqlite filesystem");
                Arc::new(SqlFs::open(path)?)
            }
        };

        Ok(match self.root.as_deref() {
            Some(root) => Arc::new(SubFs::new(fs, root)?),
            None => fs,
        })
    }
}
