//! Error types for the Daybook engine.

use crate::{DocumentId, EntryId};
use serde::Serialize;
use thiserror::Error;

/// All possible errors from the Daybook engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("validation failed: {0}")]
    Validation(&'static str),

    // State errors
    #[error("collection '{0}' has not been loaded")]
    NotLoaded(&'static str),

    #[error("entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("position {position} out of range for {len} entries")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    // Storage errors
    #[error("storage error for key '{key}': {reason}")]
    Storage { key: String, reason: String },

    #[error("corrupt blob under key '{key}': {reason}")]
    CorruptBlob { key: String, reason: String },

    // Remote errors
    #[error("document backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{message}: {reason}")]
    Remote {
        /// Message shown to the user
        message: &'static str,
        /// Underlying backend failure
        reason: String,
    },

    #[error("connection lost: {0}")]
    Connection(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A user-visible message raised by a failed screen action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Error {
    /// Build a storage error for a key.
    pub fn storage(key: impl Into<String>, reason: impl ToString) -> Self {
        Error::Storage {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a remote failure with the message the user sees.
    pub fn remote(message: &'static str, reason: impl ToString) -> Self {
        Error::Remote {
            message,
            reason: reason.to_string(),
        }
    }

    /// Whether the error was caught before any persistence attempt.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// The alert a screen shows for this error.
    pub fn alert(&self) -> Alert {
        let message = match self {
            Error::Validation(msg) => (*msg).to_string(),
            Error::Remote { message, .. } => (*message).to_string(),
            Error::BackendUnavailable(_) => "Database not available".to_string(),
            Error::Connection(_) => "Failed to connect to database".to_string(),
            Error::Storage { .. } => "Could not save your changes.".to_string(),
            Error::CorruptBlob { .. } => "Saved data could not be read.".to_string(),
            other => other.to_string(),
        };
        Alert {
            title: "Error".to_string(),
            message,
        }
    }
}
