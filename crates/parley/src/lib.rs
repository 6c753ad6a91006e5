//! # Parley
//!
//! Stateful conversations for chat bots.
//!
//! ## Overview
//!
//! Parley keeps per-user conversation state in memory between independent
//! chat events and composes business callbacks with reusable cross-cutting
//! stages: authorization, conversation lifecycle, error recovery, and post
//! actions that delete the triggering message or acknowledge a callback
//! query.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌───────────────────────────────────────┐
//! │   Runtime   │────▶│ Dispatcher │────▶│ Matcher "command:start_order"         │──▶ pipelines
//! │ (event loop)│     │  (scopes)  │────▶│ Matcher "callback:AddItem"            │──▶ pipelines
//! └─────────────┘     └────────────┘────▶│ Matcher ...                           │──▶ pipelines
//!                                        └───────────────────────────────────────┘
//! ```
//!
//! - **Runtime**: pulls events from a channel, bounds concurrency, shuts down gracefully
//! - **Dispatcher**: resolves the global/chat/user scopes and runs matchers in order
//! - **Matchers**: pattern checks (`on_command`, `on_callback`, `on_text`, ...)
//! - **Pipelines**: tower stacks built by [`Pipeline`](framework::Pipeline) in a fixed stage order
//! - **Handlers**: async functions whose arguments are extracted from the context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! #[derive(Default)]
//! struct OrderRequest {
//!     items: Vec<String>,
//! }
//!
//! async fn start_order() -> &'static str {
//!     "What would you like to order?"
//! }
//!
//! async fn add_item(order: Conversation<OrderRequest>, item: Callback<AddItem>) -> String {
//!     order.update(|o| o.items.push(item.name.clone())).await;
//!     format!("Added {}", item.name)
//! }
//!
//! let dispatcher = Dispatcher::default()
//!     .with(on_command("start_order").service(
//!         Pipeline::new().init::<OrderRequest>().exit_on_error().handler(start_order),
//!     ))
//!     .with(on_callback::<AddItem>().service(
//!         Pipeline::new().callback::<AddItem>().inject::<OrderRequest>().handler(add_item),
//!     ));
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output
//! - `testing`: recording messenger and event builders

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use parley_runtime::{BotConfig, ParleyConfig, ParleyRuntime};

    // Dispatch and registration
    pub use parley_framework::{
        ConversationBuilder, Dispatcher, Matcher, on_callback, on_command, on_event, on_message,
        on_text,
    };

    // Pipelines
    pub use parley_framework::{HandlerDescriptor, Outcome, Pipeline};

    // Extractors - for handler parameters
    pub use parley_framework::{
        Callback, Chat, CommandArgs, Conversation, FromContext, Global, Shared, Text, User,
    };

    // Context and errors
    pub use parley_framework::{BoxError, ConversationError, HandlerContext};

    // Collaborators
    pub use parley_core::{
        BoxedMessenger, ChatId, Entity, InboundEvent, MemoryRepository, MessageId, Messenger,
        Repository, UserId,
    };
}
