//! Event dispatcher for the Parley framework.
//!
//! The [`Dispatcher`] receives events, resolves their scopes and distributes
//! them to registered [`Matcher`]s:
//!
//! 1. The (global, chat, user) scopes are resolved from the [`ScopeStore`]
//! 2. Matchers are checked in registration order
//! 3. For each matcher where the check passes, its pipelines are executed
//! 4. If a blocking matcher handled the event, or propagation was stopped
//!    through [`HandlerContext::stop_propagation`], dispatch stops
//!
//! Errors (and panics) escaping a pipeline are handed to the error hook
//! registered with [`Dispatcher::on_error`]; the default hook logs them.
//!
//! ```rust,ignore
//! let store = Arc::new(ScopeStore::new());
//! let dispatcher = Dispatcher::new(store)
//!     .with(on_command("start_order").service(start_order))
//!     .on_error(|ctx, err| async move {
//!         if err.is::<UserNotRegistered>() {
//!             ctx.messenger().send_message(ctx.chat_id(), "Please /start first").await.ok();
//!         }
//!     });
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::BoxError;
use tracing::{Instrument, debug, error, info_span};

use crate::context::HandlerContext;
use crate::error::HandlerPanic;
use crate::matcher::Matcher;
use crate::scope::ScopeStore;
use parley_core::{BoxedMessenger, InboundEvent};

/// The hook receiving errors that escaped a pipeline.
pub type ErrorHandler =
    Arc<dyn Fn(Arc<HandlerContext>, BoxError) -> BoxFuture<'static, ()> + Send + Sync>;

/// The central event dispatcher.
///
/// `Dispatcher` is `Send + Sync` and cheap to clone; a runtime typically
/// shares one instance across all dispatch tasks.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<ScopeStore>,
    matchers: Vec<Matcher>,
    error_handler: ErrorHandler,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(ScopeStore::new()))
    }
}

fn log_error(ctx: Arc<HandlerContext>, err: BoxError) -> BoxFuture<'static, ()> {
    error!(
        user_id = %ctx.user_id(),
        chat_id = %ctx.chat_id(),
        "Unhandled error: {err}"
    );
    futures::future::ready(()).boxed()
}

impl Dispatcher {
    /// Creates a dispatcher resolving scopes from `store`.
    pub fn new(store: Arc<ScopeStore>) -> Self {
        Self {
            store,
            matchers: Vec::new(),
            error_handler: Arc::new(log_error),
        }
    }

    /// Adds a matcher to this dispatcher.
    ///
    /// Matchers are checked in the order they are added.
    pub fn add(&mut self, matcher: Matcher) {
        self.matchers.push(matcher);
    }

    /// Adds a matcher to this dispatcher (builder pattern).
    pub fn with(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Replaces the error hook.
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<HandlerContext>, BoxError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.error_handler = Arc::new(move |ctx, err| f(ctx, err).boxed());
        self
    }

    /// Returns the number of registered matchers.
    pub fn matcher_count(&self) -> usize {
        self.matchers.len()
    }

    /// Clears all registered matchers.
    pub fn clear(&mut self) {
        self.matchers.clear();
    }

    /// Returns the scope store.
    pub fn scopes(&self) -> &Arc<ScopeStore> {
        &self.store
    }

    /// Dispatches an event to all registered matchers.
    ///
    /// # Returns
    ///
    /// `true` if any matcher handled the event (or failed while handling it),
    /// `false` otherwise.
    pub async fn dispatch(&self, event: InboundEvent, messenger: BoxedMessenger) -> bool {
        let span = info_span!(
            "dispatch",
            chat_id = %event.chat_id,
            user_id = %event.user_id,
            kind = ?event.kind()
        );
        self.dispatch_inner(event, messenger).instrument(span).await
    }

    async fn dispatch_inner(&self, event: InboundEvent, messenger: BoxedMessenger) -> bool {
        let scopes = self.store.resolve(&event);
        let ctx = Arc::new(HandlerContext::new(event, messenger, scopes));
        let mut any_matched = false;

        for matcher in &self.matchers {
            if !ctx.is_propagating() {
                debug!("Propagation stopped by handler");
                break;
            }

            let run = AssertUnwindSafe(matcher.execute(Arc::clone(&ctx)))
                .catch_unwind()
                .await;
            let matched = match run {
                Ok(Ok(matched)) => matched,
                Ok(Err(err)) => {
                    (self.error_handler)(Arc::clone(&ctx), err).await;
                    true
                }
                Err(payload) => {
                    let err = HandlerPanic::from_payload(&*payload);
                    (self.error_handler)(Arc::clone(&ctx), Box::new(err)).await;
                    true
                }
            };

            if matched {
                any_matched = true;
                if matcher.is_blocking() {
                    debug!(
                        matcher = matcher.get_name().unwrap_or("unnamed"),
                        "Blocking matcher matched, stopping dispatch"
                    );
                    break;
                }
            }
        }

        any_matched
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("matcher_count", &self.matchers.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::error::{ConversationError, ExtractError};
    use crate::matcher_builders::{on_command, on_event};
    use crate::pipeline::Pipeline;
    use crate::testing::{RecordingMessenger, message};
    use parley_core::MessageId;
    use parking_lot::Mutex;
    use parley_core::UserId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn messenger() -> (Arc<RecordingMessenger>, BoxedMessenger) {
        let recording = Arc::new(RecordingMessenger::new());
        (Arc::clone(&recording), recording)
    }

    #[tokio::test]
    async fn test_dispatch_no_matchers() {
        let dispatcher = Dispatcher::default();
        let (_, m) = messenger();
        assert!(!dispatcher.dispatch(message(1, 1, "hi"), m).await);
    }

    #[tokio::test]
    async fn test_dispatch_with_matcher() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut dispatcher = Dispatcher::default();
        dispatcher.add(Matcher::new().check(|_| true).handler(move || {
            let c = Arc::clone(&counter_clone);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let (_, m) = messenger();
        assert!(dispatcher.dispatch(message(1, 1, "hi"), m).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocking_matcher_stops_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter1 = Arc::clone(&counter);
        let counter2 = Arc::clone(&counter);

        let dispatcher = Dispatcher::default()
            .with(Matcher::new().block(true).handler(move || {
                let c = Arc::clone(&counter1);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .with(Matcher::new().handler(move || {
                let c = Arc::clone(&counter2);
                async move {
                    c.fetch_add(10, Ordering::SeqCst);
                }
            }));

        let (_, m) = messenger();
        dispatcher.dispatch(message(1, 1, "hi"), m).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_blocking_matchers_all_run() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter1 = Arc::clone(&counter);
        let counter2 = Arc::clone(&counter);

        let dispatcher = Dispatcher::default()
            .with(Matcher::new().handler(move || {
                let c = Arc::clone(&counter1);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .with(Matcher::new().handler(move || {
                let c = Arc::clone(&counter2);
                async move {
                    c.fetch_add(10, Ordering::SeqCst);
                }
            }));

        let (_, m) = messenger();
        dispatcher.dispatch(message(1, 1, "hi"), m).await;
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_stop_propagation_skips_later_matchers() {
        let stopper = Dispatcher::default()
            .with(
                Matcher::new()
                    .check(|ctx| {
                        ctx.stop_propagation();
                        true
                    })
                    .handler(|| async {}),
            )
            .with(Matcher::new().handler(|| async { "late" }));

        let (recording, m) = messenger();
        assert!(stopper.dispatch(message(1, 1, "hi"), m).await);
        assert!(recording.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn test_errors_reach_the_hook() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);

        let dispatcher = Dispatcher::default()
            .with(on_command("boom").handler(|| async {
                Err::<(), _>(std::io::Error::other("user not registered"))
            }))
            .with(on_command("panic").handler(|text: crate::extractor::Text| async move {
                if text.starts_with('/') {
                    panic!("bad state");
                }
            }))
            .on_error(move |ctx, err| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(format!("{}: {err}", ctx.user_id()));
                }
            });

        let (_, m) = messenger();
        assert!(dispatcher.dispatch(message(1, 7, "/boom"), m.clone()).await);
        assert!(dispatcher.dispatch(message(1, 8, "/panic"), m).await);

        assert_eq!(
            *seen.lock(),
            vec![
                "7: user not registered".to_string(),
                "8: handler panicked: bad state".to_string(),
            ]
        );
        assert_eq!(dispatcher.scopes().user_count(), 2);
        assert!(dispatcher.scopes().user(UserId(7)).conversations().active().is_empty());
    }

    #[derive(Debug, Default)]
    struct OrderRequest {
        items: Vec<String>,
    }

    #[tokio::test]
    async fn test_cleaned_up_conversation_unreachable_from_later_matchers() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);

        let dispatcher = Dispatcher::default()
            .with(
                on_command("file_order").service(
                    Pipeline::new()
                        .cleanup::<OrderRequest>()
                        .handler(|_order: Conversation<OrderRequest>| async {}),
                ),
            )
            .with(on_event().handler(|order: Conversation<OrderRequest>| async move {
                let items = order.update(|o| o.items.len()).await;
                format!("late handler saw {items} items")
            }))
            .on_error(move |_ctx, err| {
                let sink = Arc::clone(&sink);
                async move {
                    let kind = match err.downcast_ref::<ExtractError>() {
                        Some(ExtractError::ConversationNotInjected { .. }) => "not injected",
                        _ => "other",
                    };
                    sink.lock().push(kind.to_string());
                }
            });
        let user = dispatcher.scopes().user(UserId(1));
        user.conversations()
            .initialize::<OrderRequest>()
            .unwrap()
            .update(|o| o.items.push("bread".into()))
            .await;

        let (recording, m) = messenger();
        assert!(dispatcher.dispatch(message(1, 1, "/file_order"), m).await);

        assert!(matches!(
            user.conversations().get::<OrderRequest>(),
            Err(ConversationError::NotFound { .. })
        ));
        assert!(recording.sent_texts().is_empty());
        assert_eq!(*seen.lock(), vec!["not injected".to_string()]);
    }

    #[tokio::test]
    async fn test_panicking_handler_still_deletes_message() {
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&hook_calls);

        let dispatcher = Dispatcher::default()
            .with(
                on_command("purge").service(
                    Pipeline::new()
                        .delete_message_after()
                        .handler(|text: crate::extractor::Text| async move {
                            if text.starts_with('/') {
                                panic!("purge failed");
                            }
                        }),
                ),
            )
            .on_error(move |_ctx, _err| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            });

        let (recording, m) = messenger();
        assert!(dispatcher.dispatch(message(1, 1, "/purge"), m).await);
        assert_eq!(recording.deleted(), vec![MessageId(1)]);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }
}
