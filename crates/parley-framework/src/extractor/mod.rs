//! Extractor system for the Parley framework.
//!
//! Handler functions declare what they need as parameters and the framework
//! provides it. Every parameter type implements [`FromContext`]:
//!
//! ```rust,ignore
//! pub trait FromContext: Sized {
//!     fn from_context(ctx: &HandlerContext) -> ExtractResult<Self>;
//! }
//! ```
//!
//! # Built-in extractors
//!
//! | Type | Provides |
//! |------|----------|
//! | [`InboundEvent`](parley_core::InboundEvent) | a clone of the event |
//! | [`Text`], [`CommandArgs`] | message text / command arguments |
//! | [`Callback<T>`] | typed view of the callback payload |
//! | [`Conversation<T>`](crate::Conversation) | the conversation injected by the lifecycle stage |
//! | [`Global`], [`Chat`], [`User`] | the resolved scope objects |
//! | [`Shared<T>`] | a clone of a `T` stored in the global scope |
//! | [`BoxedMessenger`](parley_core::BoxedMessenger) | the messenger |
//!
//! # Error Handling
//!
//! A failing extractor aborts the handler call with an [`ExtractError`]
//! (crate::ExtractError), which travels up the pipeline like any other
//! handler failure. `Option<T>` never fails.

pub mod callback;
pub mod conversation;
pub mod core;
pub mod event;
pub mod scope;

pub use callback::Callback;
pub use core::FromContext;
pub use event::{CommandArgs, Text};
pub use scope::{Chat, Global, Shared, User};
