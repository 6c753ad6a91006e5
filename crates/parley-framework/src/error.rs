//! Error types for the Parley framework.

use thiserror::Error;

use parley_core::{EventKind, UserId};

/// Errors raised by the conversation lifecycle primitives.
///
/// Both variants signal a flow-ordering mistake rather than a runtime
/// condition: a conversation was started twice, or a step ran for a
/// conversation that was never started (or already cleaned up).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    /// An instance of this conversation type is already active for the user.
    #[error("conversation '{conversation}' is already active for user {user_id}")]
    Conflict {
        /// Type name of the conversation state.
        conversation: &'static str,
        /// The user owning the conversation.
        user_id: UserId,
    },

    /// No instance of this conversation type is active for the user.
    #[error("no active conversation '{conversation}' for user {user_id}")]
    NotFound {
        /// Type name of the conversation state.
        conversation: &'static str,
        /// The user owning the conversation.
        user_id: UserId,
    },
}

/// Errors that can occur while extracting handler arguments.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The event is not of the kind the extractor requires.
    #[error("event kind mismatch: expected {expected:?}, got {got:?}")]
    EventKindMismatch {
        /// Required event kind.
        expected: EventKind,
        /// Actual event kind.
        got: EventKind,
    },

    /// The message carries no text.
    #[error("message has no text")]
    MissingText,

    /// The callback payload is not of the declared type.
    #[error("callback payload mismatch: expected '{expected}', got '{got}'")]
    PayloadTypeMismatch {
        /// Declared payload type name.
        expected: &'static str,
        /// Actual payload type name.
        got: &'static str,
    },

    /// The handler asked for a conversation that no lifecycle stage injected.
    #[error("conversation '{conversation}' was not injected by a lifecycle stage")]
    ConversationNotInjected {
        /// Type name of the conversation state.
        conversation: &'static str,
    },

    /// The requested shared state is not stored in the global scope.
    #[error("shared state '{state}' not found in global scope")]
    SharedStateMissing {
        /// Type name of the requested state.
        state: &'static str,
    },

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// A business callback panicked.
///
/// Produced when a panic is caught by an error boundary or by the dispatcher,
/// carrying the panic message when it was a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    pub message: String,
}

impl HandlerPanic {
    /// Builds the error from a payload returned by `catch_unwind`.
    pub fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        Self { message }
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type for conversation lifecycle operations.
pub type ConversationResult<T> = Result<T, ConversationError>;
