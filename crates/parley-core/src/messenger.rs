//! Messenger trait and related types.
//!
//! The `Messenger` is the outbound half of the platform integration: the
//! pipeline uses it to send the error-boundary message, delete triggering
//! messages and acknowledge callback queries, and handlers use it for their
//! own replies. Delivery is owned by the implementation; every call may fail.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::id::{CallbackId, ChatId, MessageId};

/// The outbound messaging capability.
///
/// # API Design
///
/// - `send_message`: post text to a chat and return the new message's id
/// - `delete_message`: remove a message from a chat
/// - `answer_callback`: acknowledge an inline callback query so the client
///   stops showing its progress indicator
///
/// Concrete implementations (platform clients, test doubles) implement all
/// three; there are no default methods because silently succeeding would hide
/// a missing integration.
#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    /// Sends `text` to `chat_id`.
    ///
    /// # Returns
    ///
    /// The id of the sent message.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> ApiResult<MessageId>;

    /// Deletes `message_id` from `chat_id`.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> ApiResult<()>;

    /// Acknowledges the callback query `callback_id`.
    async fn answer_callback(&self, callback_id: &CallbackId) -> ApiResult<()>;
}

/// A shared Messenger trait object.
pub type BoxedMessenger = Arc<dyn Messenger>;
