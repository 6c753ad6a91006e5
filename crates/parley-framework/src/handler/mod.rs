//! Handler system for the Parley framework.
//!
//! This module contains the adapter that turns plain async functions into
//! tower services:
//!
//! - **Handler** ([`traits`]): The core [`Handler`] trait, implemented for
//!   async functions whose parameters implement
//!   [`FromContext`](crate::extractor::FromContext)
//! - **Response** ([`response`]): [`HandlerResponse`], turning return values
//!   into an [`Outcome`](crate::Outcome) plus side effects
//! - **Service** ([`service`]): [`HandlerService`], the innermost service of
//!   every pipeline
//!
//! ```rust,ignore
//! // No parameters, no return
//! async fn ping() {}
//!
//! // Extractors in, reply out
//! async fn add_item(args: CommandArgs, order: Conversation<OrderRequest>) -> String {
//!     order.update(|o| o.items.push(args.0.clone())).await;
//!     format!("Added {}", args.0)
//! }
//!
//! // Fallible
//! async fn file_order(order: Conversation<OrderRequest>) -> anyhow::Result<String> {
//!     ...
//! }
//! ```
//!
//! Cross-cutting behavior (authorization, conversation lifecycle, error
//! containment, post actions) is not part of a handler; it is stacked around
//! the [`HandlerService`] by [`Pipeline`](crate::pipeline::Pipeline).

pub mod response;
pub mod service;
pub mod traits;

pub use response::HandlerResponse;
pub use service::HandlerService;
pub use traits::Handler;
