use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::debug;

use crate::context::HandlerContext;
use crate::outcome::Outcome;
use parley_core::UserId;

/// Lets only allow-listed users through.
///
/// Anyone else gets `Ok(Outcome::Skipped)` without any inner stage running,
/// which is indistinguishable to the user from the bot ignoring the event.
#[derive(Debug, Clone)]
pub struct AuthorizeLayer {
    allowed: Arc<HashSet<UserId>>,
}

impl AuthorizeLayer {
    pub fn new(allowed: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            allowed: Arc::new(allowed.into_iter().collect()),
        }
    }

    pub(crate) fn from_shared(allowed: Arc<HashSet<UserId>>) -> Self {
        Self { allowed }
    }
}

impl<S> Layer<S> for AuthorizeLayer {
    type Service = AuthorizeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeService {
            inner,
            allowed: Arc::clone(&self.allowed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizeService<S> {
    inner: S,
    allowed: Arc<HashSet<UserId>>,
}

impl<S> Service<Arc<HandlerContext>> for AuthorizeService<S>
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
        let allowed = Arc::clone(&self.allowed);
        Box::pin(async move {
            if !allowed.contains(&ctx.user_id()) {
                debug!(
                    user_id = %ctx.user_id(),
                    stage = "authorize",
                    "User not on allow-list, skipping"
                );
                return Ok(Outcome::Skipped);
            }
            inner.call(ctx).await
        })
    }
}
