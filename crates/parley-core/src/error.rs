//! Error types for the collaborator interfaces.
//!
//! Framework-level errors (conversation lifecycle, extraction) are defined in
//! `parley-framework`.

use thiserror::Error;

// =============================================================================
// Messenger Errors
// =============================================================================

/// Errors returned by a [`Messenger`](crate::Messenger) call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The messenger has no live connection to the platform.
    #[error("messenger is not connected")]
    NotConnected,
    /// The call timed out.
    #[error("API call timed out")]
    Timeout,
    /// The platform rejected the call.
    #[error("API error ({code}): {message}")]
    Rejected { code: i64, message: String },
    /// The message to act on no longer exists.
    #[error("message not found")]
    MessageNotFound,
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Creates a rejection error with the given platform code and message.
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }
}

// =============================================================================
// Repository Errors
// =============================================================================

/// Errors returned by a [`Repository`](crate::Repository).
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// An entity with the same id is already stored.
    #[error("entity '{id}' already exists")]
    Duplicate {
        /// Debug rendering of the conflicting id.
        id: String,
    },

    /// No entity with the given id is stored.
    #[error("entity '{id}' not found")]
    NotFound {
        /// Debug rendering of the missing id.
        id: String,
    },

    /// The storage backend failed.
    #[error("repository backend error: {0}")]
    Backend(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for messenger calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;
