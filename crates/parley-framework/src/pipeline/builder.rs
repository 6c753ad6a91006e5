use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};

use super::authorize::AuthorizeLayer;
use super::boundary::ErrorBoundaryLayer;
use super::envelope::{CallbackEnvelopeLayer, PayloadSpec};
use super::guard::ConversationGuardLayer;
use super::lifecycle::{LifecycleLayer, LifecycleSpec};
use super::post::DeleteMessageLayer;
use super::{DEFAULT_FAILURE_MESSAGE, LifecycleMode, Stage};
use crate::context::HandlerContext;
use crate::conversation::ConversationState;
use crate::handler::{Handler, HandlerService};
use crate::outcome::Outcome;
use parley_core::UserId;

/// The type-erased service stored in a [`HandlerDescriptor`].
pub type BoxedPipelineService = BoxCloneSyncService<Arc<HandlerContext>, Outcome, BoxError>;

/// Builder for a [`HandlerDescriptor`].
///
/// Every method enables one optional stage. The call order does not matter;
/// [`handler`](Self::handler) always stacks the stages in the fixed order
/// documented on the [module](super).
#[derive(Debug, Clone)]
pub struct Pipeline {
    authorized: Option<Arc<HashSet<UserId>>>,
    delete_message: bool,
    payload: Option<PayloadSpec>,
    answer_callback: bool,
    boundary_message: Option<Arc<str>>,
    lifecycle: Option<LifecycleSpec>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// An empty pipeline: just the handler.
    pub fn new() -> Self {
        Self {
            authorized: None,
            delete_message: false,
            payload: None,
            answer_callback: true,
            boundary_message: None,
            lifecycle: None,
        }
    }

    /// Restricts the handler to the given users.
    ///
    /// Calling it again replaces the allow-list.
    pub fn authorize(mut self, users: impl IntoIterator<Item = UserId>) -> Self {
        self.authorized = Some(Arc::new(users.into_iter().collect()));
        self
    }

    /// Starts a conversation of type `T` and injects it.
    ///
    /// A pipeline has at most one lifecycle stage; the last of
    /// `init`/`inject`/`cleanup` called wins.
    pub fn init<T: ConversationState>(self) -> Self {
        self.lifecycle(LifecycleSpec::of::<T>(LifecycleMode::Init))
    }

    /// Injects the active conversation of type `T`.
    pub fn inject<T: ConversationState>(self) -> Self {
        self.lifecycle(LifecycleSpec::of::<T>(LifecycleMode::Inject))
    }

    /// Injects the active conversation of type `T` and discards it afterwards.
    pub fn cleanup<T: ConversationState>(self) -> Self {
        self.lifecycle(LifecycleSpec::of::<T>(LifecycleMode::Cleanup))
    }

    fn lifecycle(mut self, spec: LifecycleSpec) -> Self {
        self.lifecycle = Some(spec);
        self
    }

    /// Adds an error boundary sending [`DEFAULT_FAILURE_MESSAGE`].
    pub fn exit_on_error(self) -> Self {
        self.exit_on_error_with(DEFAULT_FAILURE_MESSAGE)
    }

    /// Adds an error boundary sending `message`.
    pub fn exit_on_error_with(mut self, message: impl Into<Arc<str>>) -> Self {
        self.boundary_message = Some(message.into());
        self
    }

    /// Deletes the triggering message after the handler, even if it failed.
    pub fn delete_message_after(mut self) -> Self {
        self.delete_message = true;
        self
    }

    /// Requires a callback event whose payload is a `T`.
    ///
    /// The query is answered after the handler unless
    /// [`answer_callback(false)`](Self::answer_callback) is set.
    pub fn callback<T: Send + Sync + 'static>(mut self) -> Self {
        self.payload = Some(PayloadSpec::of::<T>());
        self
    }

    /// Whether a callback pipeline answers the query. Defaults to `true`.
    pub fn answer_callback(mut self, answer: bool) -> Self {
        self.answer_callback = answer;
        self
    }

    /// Returns the stages this pipeline will compose, outermost first.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(7);
        if let Some(allowed) = &self.authorized {
            stages.push(Stage::Authorize {
                allowed: allowed.len(),
            });
        }
        if self.delete_message {
            stages.push(Stage::DeleteMessage);
        }
        if let Some(payload) = &self.payload {
            stages.push(Stage::CallbackEnvelope {
                payload: payload.name,
                answer: self.answer_callback,
            });
        }
        if self.lifecycle.is_some() {
            stages.push(Stage::ConversationGuard);
        }
        if self.boundary_message.is_some() {
            stages.push(Stage::ErrorBoundary);
        }
        if let Some(spec) = &self.lifecycle {
            stages.push(Stage::Lifecycle {
                mode: spec.mode,
                conversation: spec.conversation,
            });
        }
        stages.push(Stage::Handler);
        stages
    }

    /// Composes the stages around `handler`.
    pub fn handler<H, T>(self, handler: H) -> HandlerDescriptor
    where
        H: Handler<T>,
        T: Send + 'static,
    {
        let stages: Arc<[Stage]> = self.stages().into();
        let lifecycle = self.lifecycle;

        let boundary = self.boundary_message.map(|message| {
            let layer = ErrorBoundaryLayer::new(message);
            match &lifecycle {
                Some(spec) => layer.terminating_id(spec.type_id, spec.conversation),
                None => layer,
            }
        });
        let answer = self.answer_callback;

        let service = ServiceBuilder::new()
            .option_layer(self.authorized.map(AuthorizeLayer::from_shared))
            .option_layer(self.delete_message.then_some(DeleteMessageLayer))
            .option_layer(
                self.payload
                    .map(|payload| CallbackEnvelopeLayer::from_spec(payload, answer)),
            )
            .option_layer(lifecycle.is_some().then_some(ConversationGuardLayer))
            .option_layer(boundary)
            .option_layer(lifecycle.map(LifecycleLayer::from_spec))
            .service(HandlerService::new(handler));

        HandlerDescriptor {
            stages,
            service: BoxCloneSyncService::new(service),
        }
    }
}

/// A handler with its pipeline composed around it.
///
/// Built once by [`Pipeline::handler`] and immutable afterwards. Cloning is
/// cheap.
#[derive(Clone)]
pub struct HandlerDescriptor {
    stages: Arc<[Stage]>,
    service: BoxedPipelineService,
}

impl HandlerDescriptor {
    /// A descriptor with no stages besides the handler.
    pub fn new<H, T>(handler: H) -> Self
    where
        H: Handler<T>,
        T: Send + 'static,
    {
        Pipeline::new().handler(handler)
    }

    /// Wraps an already composed service.
    pub(crate) fn from_service<S>(stages: Vec<Stage>, service: S) -> Self
    where
        S: Service<Arc<HandlerContext>, Response = Outcome, Error = BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            stages: stages.into(),
            service: BoxCloneSyncService::new(service),
        }
    }

    /// The composed stages, outermost first.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs the pipeline for `ctx`.
    pub async fn call(&self, ctx: Arc<HandlerContext>) -> Result<Outcome, BoxError> {
        self.service.clone().oneshot(ctx).await
    }
}

impl Service<Arc<HandlerContext>> for HandlerDescriptor {
    type Response = Outcome;
    type Error = BoxError;
    type Future = <BoxedPipelineService as Service<Arc<HandlerContext>>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, ctx: Arc<HandlerContext>) -> Self::Future {
        self.service.call(ctx)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}
