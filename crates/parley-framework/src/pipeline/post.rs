use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::{trace, warn};

use crate::context::HandlerContext;
use crate::outcome::Outcome;

/// Deletes the triggering message once everything inside has finished.
///
/// The delete is attempted whether the inner stages succeeded, failed or
/// panicked, and the inner result is returned unchanged (a panic resumes after
/// the delete). A failed delete is logged and
/// otherwise ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteMessageLayer;

impl<S> Layer<S> for DeleteMessageLayer {
    type Service = DeleteMessageService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeleteMessageService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteMessageService<S> {
    inner: S,
}

impl<S> Service<Arc<HandlerContext>> for DeleteMessageService<S>
where
    S: Service<Arc<HandlerContext>, Response = Outcome, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Outcome, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, ctx: Arc<HandlerContext>) -> Self::Future {
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let inner_ctx = Arc::clone(&ctx);
            let result = AssertUnwindSafe(async move { inner.call(inner_ctx).await })
                .catch_unwind()
                .await;

            let (chat_id, message_id) = (ctx.chat_id(), ctx.event().message_id);
            match ctx.messenger().delete_message(chat_id, message_id).await {
                Ok(()) => trace!(%chat_id, %message_id, "Triggering message deleted"),
                Err(e) => warn!(
                    %chat_id,
                    %message_id,
                    stage = "delete_message",
                    "Failed to delete triggering message: {e}"
                ),
            }

            result.unwrap_or_else(|payload| std::panic::resume_unwind(payload))
        })
    }
}
