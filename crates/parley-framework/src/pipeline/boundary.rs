use std::any::TypeId;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::{error, warn};

use crate::context::HandlerContext;
use crate::error::HandlerPanic;
use crate::outcome::Outcome;

/// Contains every failure of the stages inside it.
///
/// On an `Err` or a panic the boundary:
/// 1. sends its message to the event's chat (a failed send is logged),
/// 2. discards the pipeline's conversation type, if it has one,
/// 3. returns `Ok(Outcome::Ended)`.
///
/// The original failure is logged at `error` and not rethrown.
#[derive(Debug, Clone)]
pub struct ErrorBoundaryLayer {
    message: Arc<str>,
    terminate: Option<(TypeId, &'static str)>,
}

impl ErrorBoundaryLayer {
    /// A boundary that sends `message` and terminates nothing.
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
            terminate: None,
        }
    }

    /// Also discard the user's conversation of type `T` on failure.
    pub fn terminating<T: 'static>(self) -> Self {
        self.terminating_id(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub(crate) fn terminating_id(mut self, type_id: TypeId, name: &'static str) -> Self {
        self.terminate = Some((type_id, name));
        self
    }
}

impl<S> Layer<S> for ErrorBoundaryLayer {
    type Service = ErrorBoundaryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorBoundaryService {
            inner,
            message: Arc::clone(&self.message),
            terminate: self.terminate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorBoundaryService<S> {
    inner: S,
    message: Arc<str>,
    terminate: Option<(TypeId, &'static str)>,
}

impl<S> Service<Arc<HandlerContext>> for ErrorBoundaryService<S>
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
        let message = Arc::clone(&self.message);
        let terminate = self.terminate;
        Box::pin(async move {
            let inner_ctx = Arc::clone(&ctx);
            let result = AssertUnwindSafe(async move { inner.call(inner_ctx).await })
                .catch_unwind()
                .await;

            let failure: BoxError = match result {
                Ok(Ok(outcome)) => return Ok(outcome),
                Ok(Err(e)) => e,
                Err(payload) => HandlerPanic::from_payload(&*payload).into(),
            };

            error!(
                user_id = %ctx.user_id(),
                chat_id = %ctx.chat_id(),
                stage = "error_boundary",
                "Handler failed, ending conversation: {failure}"
            );

            if let Err(e) = ctx.messenger().send_message(ctx.chat_id(), &message).await {
                warn!(chat_id = %ctx.chat_id(), "Failed to send failure message: {e}");
            }

            if let Some((type_id, name)) = terminate {
                if ctx.user().conversations().discard_by_id(type_id) {
                    warn!(
                        user_id = %ctx.user_id(),
                        conversation = name,
                        "Conversation force-terminated"
                    );
                }
            }

            Ok(Outcome::Ended)
        })
    }
}
