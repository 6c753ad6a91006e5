//! # Parley Framework
//!
//! Stateful conversation and handler-composition layer for Parley bots.
//!
//! This layer provides:
//! - Isolation scopes (global, per chat, per user) for application state
//! - Per-user conversation registries keyed by conversation state type
//! - Handler trait for Axum-style dependency injection
//! - Fixed-order handler pipelines (authorization, lifecycle, error boundary,
//!   post actions) built as tower layers
//! - Matchers, matcher builders (`on_command`, `on_callback`, ...) and the
//!   dispatcher
//! - Grouped conversation flows (`ConversationBuilder`) with entry points,
//!   steps and fallbacks
//!
//! Test doubles live in [`testing`], available with the `testing` feature.

pub mod context;
pub mod conversation;
pub mod conversation_builder;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod matcher;
pub mod matcher_builders;
pub mod outcome;
pub mod pipeline;
pub mod scope;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::HandlerContext;
pub use conversation::{Conversation, ConversationRegistry, ConversationState};
pub use conversation_builder::ConversationBuilder;
pub use dispatcher::{Dispatcher, ErrorHandler};
pub use error::{
    ConversationError, ConversationResult, ExtractError, ExtractResult, HandlerPanic,
};
pub use extractor::{Callback, Chat, CommandArgs, FromContext, Global, Shared, Text, User};
pub use handler::{Handler, HandlerResponse, HandlerService};
pub use matcher::{CheckFn, Matcher};
pub use matcher_builders::{on_callback, on_command, on_event, on_message, on_text};
pub use outcome::Outcome;
pub use pipeline::{DEFAULT_FAILURE_MESSAGE, HandlerDescriptor, LifecycleMode, Pipeline, Stage};
pub use scope::{ChatScope, GlobalScope, ScopeStore, Scopes, StateMap, UserScope};

pub use tower::BoxError;
