use std::any::TypeId;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::debug;

use super::LifecycleMode;
use crate::context::HandlerContext;
use crate::conversation::{Conversation, ConversationState};
use crate::error::ConversationResult;
use crate::outcome::Outcome;

/// Type-erased description of a lifecycle stage.
#[derive(Clone, Copy)]
pub(crate) struct LifecycleSpec {
    pub(crate) mode: LifecycleMode,
    pub(crate) type_id: TypeId,
    pub(crate) conversation: &'static str,
    enter: fn(&HandlerContext, LifecycleMode) -> ConversationResult<()>,
    leave: fn(&HandlerContext),
}

impl LifecycleSpec {
    pub(crate) fn of<T: ConversationState>(mode: LifecycleMode) -> Self {
        Self {
            mode,
            type_id: TypeId::of::<T>(),
            conversation: std::any::type_name::<T>(),
            enter: enter_conversation::<T>,
            leave: leave_conversation::<T>,
        }
    }
}

impl std::fmt::Debug for LifecycleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleSpec")
            .field("mode", &self.mode)
            .field("conversation", &self.conversation)
            .finish()
    }
}

fn enter_conversation<T: ConversationState>(
    ctx: &HandlerContext,
    mode: LifecycleMode,
) -> ConversationResult<()> {
    let registry = ctx.user().conversations();
    let conversation = match mode {
        LifecycleMode::Init => registry.initialize::<T>()?,
        LifecycleMode::Inject | LifecycleMode::Cleanup => registry.get::<T>()?,
    };
    ctx.inject(conversation);
    Ok(())
}

fn leave_conversation<T: ConversationState>(ctx: &HandlerContext) {
    ctx.eject::<Conversation<T>>();
}

/// Starts, resumes or finishes one conversation type around the callback.
///
/// | Mode | Before the callback | After the callback |
/// |------|---------------------|--------------------|
/// | `Init` | `initialize::<T>()`, inject | - |
/// | `Inject` | `get::<T>()`, inject | - |
/// | `Cleanup` | `get::<T>()`, inject | `discard::<T>()` on success, error and panic; success reports [`Outcome::Ended`] |
///
/// `Conflict` and `NotFound` errors are returned before the callback runs.
/// The injected handle is removed from the context once the callback
/// returns or panics.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleLayer {
    spec: LifecycleSpec,
}

impl LifecycleLayer {
    pub fn init<T: ConversationState>() -> Self {
        Self::from_spec(LifecycleSpec::of::<T>(LifecycleMode::Init))
    }

    pub fn inject<T: ConversationState>() -> Self {
        Self::from_spec(LifecycleSpec::of::<T>(LifecycleMode::Inject))
    }

    pub fn cleanup<T: ConversationState>() -> Self {
        Self::from_spec(LifecycleSpec::of::<T>(LifecycleMode::Cleanup))
    }

    pub(crate) fn from_spec(spec: LifecycleSpec) -> Self {
        Self { spec }
    }
}

impl<S> Layer<S> for LifecycleLayer {
    type Service = LifecycleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LifecycleService {
            inner,
            spec: self.spec,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleService<S> {
    inner: S,
    spec: LifecycleSpec,
}

impl<S> Service<Arc<HandlerContext>> for LifecycleService<S>
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
        let spec = self.spec;
        Box::pin(async move {
            (spec.enter)(&ctx, spec.mode)?;

            let inner_ctx = Arc::clone(&ctx);
            let result = AssertUnwindSafe(async move { inner.call(inner_ctx).await })
                .catch_unwind()
                .await;
            (spec.leave)(&ctx);

            if spec.mode == LifecycleMode::Cleanup {
                ctx.user().conversations().discard_by_id(spec.type_id);
                debug!(
                    user_id = %ctx.user_id(),
                    conversation = spec.conversation,
                    stage = "lifecycle",
                    "Conversation cleaned up"
                );
            }

            match result {
                Ok(inner_result) if spec.mode == LifecycleMode::Cleanup => {
                    inner_result.map(|_| Outcome::Ended)
                }
                Ok(inner_result) => inner_result,
                Err(payload) => std::panic::resume_unwind(payload),
            }
        })
    }
}
