//! Application configuration handed over by the shell.

use crate::{FileStore, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Which backend the task screen persists to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskBackendKind {
    /// Key-value storage on the device
    #[default]
    Local,
    /// Hosted document database
    Remote,
}

impl FromStr for TaskBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(TaskBackendKind::Local),
            "remote" => Ok(TaskBackendKind::Remote),
            other => Err(ConfigError::InvalidTaskBackend(other.to_string())),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Directory holding the local collection blobs
    pub storage_dir: PathBuf,
    /// Backend for the task screen
    #[serde(default)]
    pub task_backend: TaskBackendKind,
}

impl AppConfig {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            task_backend: TaskBackendKind::default(),
        }
    }

    pub fn with_task_backend(mut self, kind: TaskBackendKind) -> Self {
        self.task_backend = kind;
        self
    }

    /// Parse the JSON config passed across the FFI boundary.
    pub fn from_json(json: &str) -> std::result::Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidJson(e.to_string()))
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let storage_dir = lookup("DAYBOOK_STORAGE_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .ok_or(ConfigError::MissingStorageDir)?;

        let task_backend = match lookup("DAYBOOK_TASK_BACKEND") {
            Some(raw) => raw.parse()?,
            None => TaskBackendKind::default(),
        };

        Ok(Self {
            storage_dir: PathBuf::from(storage_dir),
            task_backend,
        })
    }

    /// Open the file store rooted at `storage_dir`.
    pub fn open_store(&self) -> Result<FileStore> {
        FileStore::open(&self.storage_dir)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("DAYBOOK_STORAGE_DIR environment variable is required")]
    MissingStorageDir,

    #[error("Invalid task backend '{0}' (expected 'local' or 'remote')")]
    InvalidTaskBackend(String),

    #[error("Invalid config JSON: {0}")]
    InvalidJson(String),
}
