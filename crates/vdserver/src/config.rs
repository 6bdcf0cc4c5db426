//! Broker configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use vdserver_engine::DEFAULT_CAPACITY;

/// Threads in the import indexing pool unless configured.
pub const DEFAULT_INDEX_THREADS: usize = 2;

/// Runtime settings of a [`Broker`](crate::Broker).
///
/// Every field has a default, so a configuration file only needs the
/// settings it changes:
///
/// ```json
/// { "workerThreads": 2, "commentTasks": ["TODO", "FIXME"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Threads in the query pool; `0` lets rayon pick one per core.
    pub worker_threads: usize,
    /// Threads in the separate import indexing pool; `0` lets rayon pick.
    pub index_threads: usize,
    /// Maximum number of modules in the shared parse cache.
    pub shared_cache_capacity: usize,
    /// Comment task tokens in effect until the editor configures its own.
    pub comment_tasks: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            index_threads: DEFAULT_INDEX_THREADS,
            shared_cache_capacity: DEFAULT_CAPACITY,
            comment_tasks: Vec::new(),
        }
    }
}

impl BrokerConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Errors loading a [`BrokerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}
