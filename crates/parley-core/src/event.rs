//! Inbound event record.
//!
//! An [`InboundEvent`] is what the event source hands to the dispatcher. It
//! carries the identity triple used to resolve scopes (`chat_id`, `user_id`,
//! `message_id`) and either message text or a callback query.
//!
//! # Callback payloads
//!
//! Callback queries carry an arbitrary, in-process payload (the value that was
//! attached to the inline button when it was rendered). The payload is stored
//! type-erased as a [`CallbackPayload`] and keeps its concrete type identity,
//! so consumers can check it before handing out a typed view:
//!
//! ```rust,ignore
//! #[derive(Debug)]
//! struct AddItem(String);
//!
//! let query = CallbackQuery::new("cb-1", AddItem("bread".into()));
//! assert!(query.payload_is::<AddItem>());
//! let item = query.downcast::<AddItem>().unwrap();
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::id::{CallbackId, ChatId, MessageId, UserId};

/// Type-erased callback payload.
pub type CallbackPayload = Arc<dyn Any + Send + Sync>;

/// An inline callback query attached to an inbound event.
#[derive(Clone)]
pub struct CallbackQuery {
    id: CallbackId,
    payload: CallbackPayload,
    payload_type: &'static str,
}

impl CallbackQuery {
    /// Creates a callback query carrying `payload`.
    pub fn new<T: Any + Send + Sync>(id: impl Into<CallbackId>, payload: T) -> Self {
        Self {
            id: id.into(),
            payload: Arc::new(payload),
            payload_type: std::any::type_name::<T>(),
        }
    }

    /// Returns the query id used for acknowledgement.
    pub fn id(&self) -> &CallbackId {
        &self.id
    }

    /// Returns the raw type-erased payload.
    pub fn payload(&self) -> &CallbackPayload {
        &self.payload
    }

    /// Returns the type name of the payload, for diagnostics.
    pub fn payload_type_name(&self) -> &'static str {
        self.payload_type
    }

    /// Returns the type identity of the payload.
    pub fn payload_type_id(&self) -> TypeId {
        (*self.payload).type_id()
    }

    /// Returns `true` if the payload is a `T`.
    pub fn payload_is<T: Any>(&self) -> bool {
        (*self.payload).is::<T>()
    }

    /// Returns a typed handle to the payload, or `None` if it is not a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }
}

impl fmt::Debug for CallbackQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQuery")
            .field("id", &self.id)
            .field("payload_type", &self.payload_type)
            .finish_non_exhaustive()
    }
}

/// Coarse classification of an [`InboundEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A regular message, possibly with text.
    Message,
    /// An inline callback query.
    Callback,
}

/// An inbound event as delivered by the event source.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Chat the event originated in.
    pub chat_id: ChatId,
    /// User that triggered the event.
    pub user_id: UserId,
    /// The originating message (for callbacks: the message carrying the button).
    pub message_id: MessageId,
    /// Message text, if any.
    pub text: Option<String>,
    /// Callback query, if the event was triggered by an inline button.
    pub callback: Option<CallbackQuery>,
}

impl InboundEvent {
    /// Creates a text message event.
    pub fn message(
        chat_id: impl Into<ChatId>,
        user_id: impl Into<UserId>,
        message_id: impl Into<MessageId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            message_id: message_id.into(),
            text: Some(text.into()),
            callback: None,
        }
    }

    /// Creates a callback query event.
    pub fn callback(
        chat_id: impl Into<ChatId>,
        user_id: impl Into<UserId>,
        message_id: impl Into<MessageId>,
        query: CallbackQuery,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            message_id: message_id.into(),
            text: None,
            callback: Some(query),
        }
    }

    pub fn kind(&self) -> EventKind {
        if self.callback.is_some() {
            EventKind::Callback
        } else {
            EventKind::Message
        }
    }

    /// Returns the message text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Parses the text as a bot command.
    ///
    /// `/file_order@my_bot  rush` yields `Some(("file_order", "rush"))`.
    /// Returns `None` for non-command text and for callback events.
    pub fn command(&self) -> Option<(&str, &str)> {
        let text = self.text()?.trim_start();
        let body = text.strip_prefix('/')?;
        let (head, args) = match body.find(char::is_whitespace) {
            Some(pos) => (&body[..pos], body[pos..].trim()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }
        Some((name, args))
    }
}
