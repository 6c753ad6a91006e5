//! Handler pipelines.
//!
//! A pipeline wraps a business callback in a fixed-order stack of optional
//! stages. Each stage is a tower [`Layer`](tower::Layer); the [`Pipeline`]
//! builder records which stages are wanted and [`Pipeline::handler`] stacks
//! them once, producing an immutable [`HandlerDescriptor`].
//!
//! # Stage order
//!
//! Outermost first, independent of the order the builder methods are called:
//!
//! ```text
//! Authorize            allow-list gate, non-members get Outcome::Skipped
//! DeleteMessage        deletes the triggering message afterwards
//! CallbackEnvelope     asserts the payload type, answers the query afterwards
//! ConversationGuard    per-user lock, present with any lifecycle stage
//! ErrorBoundary        failure -> fallback message + discard + Outcome::Ended
//! Lifecycle            init / inject / cleanup of one conversation type
//! Handler              the business callback
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let file_order = Pipeline::new()
//!     .cleanup::<OrderRequest>()
//!     .exit_on_error()
//!     .delete_message_after()
//!     .handler(file_order);
//!
//! dispatcher.add(on_command("file_order").service(file_order));
//! ```

mod authorize;
mod boundary;
mod builder;
mod envelope;
mod guard;
mod lifecycle;
mod post;

pub use authorize::{AuthorizeLayer, AuthorizeService};
pub use boundary::{ErrorBoundaryLayer, ErrorBoundaryService};
pub use builder::{HandlerDescriptor, Pipeline};
pub use envelope::{CallbackEnvelopeLayer, CallbackEnvelopeService};
pub use guard::{ConversationGuardLayer, ConversationGuardService};
pub use lifecycle::{LifecycleLayer, LifecycleService};
pub use post::{DeleteMessageLayer, DeleteMessageService};

/// Message sent by an error boundary built with [`Pipeline::exit_on_error`].
pub const DEFAULT_FAILURE_MESSAGE: &str =
    "I'm sorry, something went wrong, try again or contact an Administrator.";

/// What a lifecycle stage does with its conversation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleMode {
    /// Start a new conversation and inject it.
    Init,
    /// Inject the active conversation.
    Inject,
    /// Inject the active conversation and discard it once the callback is
    /// done, whether it succeeded or not.
    Cleanup,
}

/// One stage of a composed pipeline, as reported by
/// [`HandlerDescriptor::stages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Authorize {
        /// Size of the allow-list.
        allowed: usize,
    },
    DeleteMessage,
    CallbackEnvelope {
        /// Declared payload type name.
        payload: &'static str,
        /// Whether the query is answered afterwards.
        answer: bool,
    },
    ConversationGuard,
    ErrorBoundary,
    Lifecycle {
        mode: LifecycleMode,
        /// Conversation type name.
        conversation: &'static str,
    },
    Handler,
    /// Routes to the entry points, steps or fallbacks of a
    /// [`ConversationBuilder`](crate::ConversationBuilder).
    ConversationRouter {
        /// Conversation type name.
        conversation: &'static str,
        /// Number of registered routes.
        routes: usize,
    },
}

impl Stage {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Authorize { .. } => "authorize",
            Stage::DeleteMessage => "delete_message",
            Stage::CallbackEnvelope { .. } => "callback_envelope",
            Stage::ConversationGuard => "conversation_guard",
            Stage::ErrorBoundary => "error_boundary",
            Stage::Lifecycle { .. } => "lifecycle",
            Stage::Handler => "handler",
            Stage::ConversationRouter { .. } => "conversation_router",
        }
    }
}

#[cfg(test)]
mod tests;
