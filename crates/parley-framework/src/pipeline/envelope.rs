use std::any::TypeId;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::warn;

use crate::context::HandlerContext;
use crate::error::ExtractError;
use crate::outcome::Outcome;
use parley_core::EventKind;

/// Declared payload type of a callback pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PayloadSpec {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

impl PayloadSpec {
    pub(crate) fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// Asserts the callback payload type and answers the query afterwards.
///
/// A non-callback event or a payload of another type fails immediately with
/// an [`ExtractError`]; nothing inside runs and the query is not answered.
/// Otherwise the query is answered once the inner stages finish, whatever
/// their result and even if they panic, unless answering was disabled. A
/// failed answer is logged and ignored.
#[derive(Debug, Clone, Copy)]
pub struct CallbackEnvelopeLayer {
    payload: PayloadSpec,
    answer: bool,
}

impl CallbackEnvelopeLayer {
    /// Envelope for payloads of type `T`.
    pub fn new<T: 'static>(answer: bool) -> Self {
        Self::from_spec(PayloadSpec::of::<T>(), answer)
    }

    pub(crate) fn from_spec(payload: PayloadSpec, answer: bool) -> Self {
        Self { payload, answer }
    }
}

impl<S> Layer<S> for CallbackEnvelopeLayer {
    type Service = CallbackEnvelopeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallbackEnvelopeService {
            inner,
            payload: self.payload,
            answer: self.answer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallbackEnvelopeService<S> {
    inner: S,
    payload: PayloadSpec,
    answer: bool,
}

impl<S> Service<Arc<HandlerContext>> for CallbackEnvelopeService<S>
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
        let (payload, answer) = (self.payload, self.answer);
        Box::pin(async move {
            let event = ctx.event();
            let Some(query) = event.callback.as_ref() else {
                return Err(ExtractError::EventKindMismatch {
                    expected: EventKind::Callback,
                    got: event.kind(),
                }
                .into());
            };
            if query.payload_type_id() != payload.type_id {
                return Err(ExtractError::PayloadTypeMismatch {
                    expected: payload.name,
                    got: query.payload_type_name(),
                }
                .into());
            }
            let callback_id = query.id().clone();

            let inner_ctx = Arc::clone(&ctx);
            let result = AssertUnwindSafe(async move { inner.call(inner_ctx).await })
                .catch_unwind()
                .await;

            if answer {
                if let Err(e) = ctx.messenger().answer_callback(&callback_id).await {
                    warn!(
                        callback_id = %callback_id,
                        stage = "callback_envelope",
                        "Failed to answer callback query: {e}"
                    );
                }
            }

            result.unwrap_or_else(|payload| std::panic::resume_unwind(payload))
        })
    }
}
