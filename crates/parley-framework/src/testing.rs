//! Test doubles for code built on the framework.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `testing` feature.
//!
//! ```rust,ignore
//! let harness = TestHarness::new();
//! let ctx = harness.context(message(1, 42, "/start_order"));
//! descriptor.call(ctx).await?;
//! assert_eq!(harness.messenger.sent_texts(), vec!["Order started"]);
//! ```

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::context::HandlerContext;
use crate::scope::ScopeStore;
use parley_core::{
    ApiError, ApiResult, BoxedMessenger, CallbackId, CallbackQuery, ChatId, InboundEvent,
    MessageId, Messenger,
};

/// One call observed by a [`RecordingMessenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Sent {
        chat_id: ChatId,
        text: String,
        message_id: MessageId,
    },
    Deleted {
        chat_id: ChatId,
        message_id: MessageId,
    },
    Answered(CallbackId),
}

/// A [`Messenger`] that records every successful call.
///
/// Each operation can be switched to fail with [`ApiError::NotConnected`];
/// failed calls are not recorded. Sent messages get sequential ids starting
/// at 1000.
#[derive(Debug)]
pub struct RecordingMessenger {
    calls: Mutex<Vec<Recorded>>,
    next_id: AtomicI64,
    fail_sends: AtomicBool,
    fail_deletes: AtomicBool,
    fail_answers: AtomicBool,
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1000),
            fail_sends: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_answers: AtomicBool::new(false),
        }
    }
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_answers(&self, fail: bool) {
        self.fail_answers.store(fail, Ordering::SeqCst);
    }

    /// Returns every recorded call, in order.
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().clone()
    }

    /// Returns the texts of all sent messages, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Recorded::Sent { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Recorded::Deleted { message_id, .. } => Some(*message_id),
                _ => None,
            })
            .collect()
    }

    pub fn answered(&self) -> Vec<CallbackId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Recorded::Answered(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> ApiResult<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::NotConnected);
        }
        let message_id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.calls.lock().push(Recorded::Sent {
            chat_id,
            text: text.to_string(),
            message_id,
        });
        Ok(message_id)
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> ApiResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ApiError::NotConnected);
        }
        self.calls.lock().push(Recorded::Deleted {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &CallbackId) -> ApiResult<()> {
        if self.fail_answers.load(Ordering::SeqCst) {
            return Err(ApiError::NotConnected);
        }
        self.calls.lock().push(Recorded::Answered(callback_id.clone()));
        Ok(())
    }
}

/// A scope store plus a recording messenger, for building contexts by hand.
#[derive(Debug, Clone)]
pub struct TestHarness {
    pub store: Arc<ScopeStore>,
    pub messenger: Arc<RecordingMessenger>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(ScopeStore::new()),
            messenger: Arc::new(RecordingMessenger::new()),
        }
    }

    /// Returns the messenger as a trait object.
    pub fn boxed_messenger(&self) -> BoxedMessenger {
        self.messenger.clone()
    }

    /// Resolves scopes for `event` and wraps everything in a fresh context.
    pub fn context(&self, event: InboundEvent) -> Arc<HandlerContext> {
        let scopes = self.store.resolve(&event);
        Arc::new(HandlerContext::new(event, self.boxed_messenger(), scopes))
    }
}

/// Builds a text message event. The message id is fixed at 1.
pub fn message(chat_id: i64, user_id: i64, text: &str) -> InboundEvent {
    InboundEvent::message(chat_id, user_id, MessageId(1), text)
}

/// Builds a callback event with id `cb-<user_id>`. The message id is fixed
/// at 1.
pub fn callback<T: Any + Send + Sync>(chat_id: i64, user_id: i64, payload: T) -> InboundEvent {
    let query = CallbackQuery::new(format!("cb-{user_id}"), payload);
    InboundEvent::callback(chat_id, user_id, MessageId(1), query)
}
