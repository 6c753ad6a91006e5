//! Core handler service for the Parley framework.
//!
//! [`HandlerService<H, T>`] wraps a single handler and implements
//! `tower::Service<Arc<HandlerContext>>`. Every pipeline stage is a tower
//! layer stacked *on top* of it.

use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Service};

use super::traits::Handler;
use crate::context::HandlerContext;
use crate::outcome::Outcome;

/// A tower [`Service`] that calls a single generic handler.
///
/// # Example
///
/// ```rust,ignore
/// let svc = HandlerService::new(start_order);
/// let outcome = svc.oneshot(ctx).await?;
/// ```
pub struct HandlerService<H, T> {
    handler: H,
    // PhantomData<fn() -> T> is Send + Sync regardless of T.
    _marker: PhantomData<fn() -> T>,
}

impl<H: Clone, T> Clone for HandlerService<H, T> {
    fn clone(&self) -> Self {
        HandlerService {
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<H, T> HandlerService<H, T>
where
    H: Handler<T>,
{
    /// Wraps `handler` in a `HandlerService`.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<H, T> From<H> for HandlerService<H, T>
where
    H: Handler<T>,
{
    fn from(handler: H) -> Self {
        HandlerService::new(handler)
    }
}

impl<H, T> Service<Arc<HandlerContext>> for HandlerService<H, T>
where
    H: Handler<T>,
    T: 'static,
{
    type Response = Outcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Outcome, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<HandlerContext>) -> Self::Future {
        let handler = self.handler.clone();
        async move { handler.call(ctx).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Text;
    use crate::testing::{TestHarness, message};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_string_response_is_sent_to_chat() {
        let harness = TestHarness::new();
        let ctx = harness.context(message(10, 1, "hi"));

        async fn echo(text: Text) -> String {
            format!("you said {}", &*text)
        }

        let outcome = HandlerService::new(echo).oneshot(ctx).await.unwrap();
        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(harness.messenger.sent_texts(), vec!["you said hi"]);
    }

    #[tokio::test]
    async fn test_extract_failure_skips_handler() {
        let harness = TestHarness::new();
        let ctx = harness.context(message(10, 1, "/start"));

        async fn wants_shared(_n: crate::extractor::Shared<u32>) -> &'static str {
            "unreachable"
        }

        let err = HandlerService::new(wants_shared).oneshot(ctx).await.unwrap_err();
        assert!(err.to_string().contains("shared state"));
        assert!(harness.messenger.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn test_err_response_propagates() {
        let harness = TestHarness::new();
        let ctx = harness.context(message(10, 1, "x"));

        async fn fails() -> Result<String, std::io::Error> {
            Err(std::io::Error::other("db down"))
        }

        let err = HandlerService::new(fails).oneshot(ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "db down");
        assert!(harness.messenger.sent_texts().is_empty());
    }
}
