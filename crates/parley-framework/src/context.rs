//! Per-dispatch context.
//!
//! One [`HandlerContext`] is created for each inbound event and shared (as an
//! `Arc`) by every matcher and pipeline stage that processes it. It holds:
//!
//! - the [`InboundEvent`] and the [`BoxedMessenger`] for replies,
//! - the [`Scopes`] resolved from the event's identity; only these scopes
//!   are reachable from a handler,
//! - a small injection slot, written by pipeline stages (the lifecycle stage
//!   puts the active [`Conversation<T>`](crate::Conversation) here for the
//!   length of one pipeline call) and read by extractors,
//! - the propagation flag consulted by the dispatcher between matchers.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::scope::{ChatScope, GlobalScope, Scopes, UserScope};
use parley_core::{BoxedMessenger, ChatId, InboundEvent, Messenger, UserId};

/// The context object passed through a handler pipeline.
///
/// # Example
///
/// ```rust,ignore
/// async fn handle(ctx: Arc<HandlerContext>) {
///     let visits = ctx.user().state().get_or_insert_with(|| Visits(0));
///     ctx.messenger().send_message(ctx.chat_id(), "hello").await.ok();
///     ctx.stop_propagation(); // no further matchers will run
/// }
/// ```
pub struct HandlerContext {
    event: InboundEvent,
    messenger: BoxedMessenger,
    scopes: Scopes,
    injected: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    /// Cleared by any handler that calls [`HandlerContext::stop_propagation`].
    is_propagating: AtomicBool,
}

impl HandlerContext {
    /// Creates a context for `event`, bound to the already resolved `scopes`.
    pub fn new(event: InboundEvent, messenger: BoxedMessenger, scopes: Scopes) -> Self {
        Self {
            event,
            messenger,
            scopes,
            injected: Mutex::new(HashMap::new()),
            is_propagating: AtomicBool::new(true),
        }
    }

    // ─── Event ────────────────────────────────────────────────────────────────

    /// Returns the inbound event.
    pub fn event(&self) -> &InboundEvent {
        &self.event
    }

    pub fn chat_id(&self) -> ChatId {
        self.event.chat_id
    }

    pub fn user_id(&self) -> UserId {
        self.event.user_id
    }

    // ─── Messenger ────────────────────────────────────────────────────────────

    /// Returns a reference to the messenger.
    pub fn messenger(&self) -> &dyn Messenger {
        self.messenger.as_ref()
    }

    /// Returns a clone of the messenger `Arc`.
    pub fn messenger_arc(&self) -> BoxedMessenger {
        Arc::clone(&self.messenger)
    }

    // ─── Scopes ───────────────────────────────────────────────────────────────

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    pub fn global(&self) -> &Arc<GlobalScope> {
        &self.scopes.global
    }

    pub fn chat(&self) -> &Arc<ChatScope> {
        &self.scopes.chat
    }

    pub fn user(&self) -> &Arc<UserScope> {
        &self.scopes.user
    }

    // ─── Injection ────────────────────────────────────────────────────────────

    /// Makes `value` available to extractors until it is ejected.
    ///
    /// Only one value per type can be injected; subsequent calls overwrite.
    /// The lifecycle stage ejects its conversation when the pipeline call
    /// returns, so later pipelines of the same dispatch never see it.
    pub fn inject<T: Send + Sync + 'static>(&self, value: T) {
        self.injected
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of an injected value.
    pub fn injected<T: Clone + 'static>(&self) -> Option<T> {
        self.injected
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes an injected value, returning it if one was present.
    pub fn eject<T: 'static>(&self) -> Option<T> {
        self.injected
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    // ─── Propagation ──────────────────────────────────────────────────────────

    /// Stops propagation of this event to subsequent matchers.
    pub fn stop_propagation(&self) {
        self.is_propagating.store(false, Ordering::SeqCst);
    }

    /// Returns `true` if the event is still propagating.
    pub fn is_propagating(&self) -> bool {
        self.is_propagating.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("event", &self.event)
            .field("is_propagating", &self.is_propagating())
            .finish_non_exhaustive()
    }
}
