use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::trace;

use crate::context::HandlerContext;
use crate::outcome::Outcome;

/// Holds the user's conversation lock for the rest of the pipeline.
///
/// Two lifecycle-bearing dispatches of the same user therefore run one after
/// the other: a `cleanup` that is in progress finishes its discard before a
/// concurrent `inject` looks the conversation up. Dispatches of different
/// users never contend.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationGuardLayer;

impl<S> Layer<S> for ConversationGuardLayer {
    type Service = ConversationGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConversationGuardService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationGuardService<S> {
    inner: S,
}

impl<S> Service<Arc<HandlerContext>> for ConversationGuardService<S>
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
            let _guard = ctx.user().lock_conversations().await;
            trace!(user_id = %ctx.user_id(), "Conversation guard acquired");
            inner.call(ctx).await
        })
    }
}
