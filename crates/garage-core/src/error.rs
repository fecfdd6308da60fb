//! Error taxonomy shared by the store, storage, view, and modal layers.
//!
//! Every variant is recoverable: callers report it and keep the session
//! alive. Only the outer CLI boundary converts these into `anyhow` errors.

use thiserror::Error;

pub const TITLE_REQUIRED: &str = "Task title cannot be empty.";
pub const PROGRESS_INVALID: &str = "Progress must be a number between 0 and 100.";

#[derive(Debug, Error)]
pub enum GarageError {
    /// Rejected user input. No state changed.
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// An operation referenced an id that is not in the store.
    #[error("task not found: {id}")]
    NotFound { id: String },

    /// Persisting failed. The in-memory change is kept.
    #[error(
        "failed to save {key}: {message} (changes are kept in memory but may be lost on reload)"
    )]
    Storage { key: String, message: String },

    /// Building or painting the display failed; the previous frame stays.
    #[error("failed to display tasks: {message}")]
    Render { message: String },

    /// The notification surface refused or failed to deliver.
    #[error("failed to send notification: {message}")]
    Notification { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl GarageError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn storage(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn render(message: impl ToString) -> Self {
        Self::Render {
            message: message.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

pub type Result<T> = std::result::Result<T, GarageError>;
