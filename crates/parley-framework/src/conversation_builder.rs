//! Grouped conversation flows.
//!
//! A [`ConversationBuilder`] bundles every route of one conversation type
//! into a single [`Matcher`]:
//!
//! - **entry points** are tried while the user has no conversation of type
//!   `T`. They usually carry an `init::<T>()` stage.
//! - **steps** are tried while the conversation is active, in registration
//!   order.
//! - **fallbacks** are tried while the conversation is active and no step
//!   matched, e.g. a `/cancel` command.
//!
//! Exactly one route runs per event: the first whose check passes. A route
//! reporting [`Outcome::Ended`] (through a `cleanup` stage, an error boundary
//! or a handler returning it) ends the conversation.
//!
//! With [`allow_reentry`](ConversationBuilder::allow_reentry), an entry point
//! matching during an active conversation discards it and starts over.
//!
//! # Example
//!
//! ```rust,ignore
//! let order_flow = ConversationBuilder::<OrderRequest>::new()
//!     .name("order")
//!     .entry_point(on_command("start_order").service(
//!         Pipeline::new().init::<OrderRequest>().exit_on_error().handler(start_order),
//!     ))
//!     .step(on_callback::<AddItem>().service(
//!         Pipeline::new().callback::<AddItem>().inject::<OrderRequest>().handler(add_item),
//!     ))
//!     .step(on_text().service(Pipeline::new().inject::<OrderRequest>().handler(add_note)))
//!     .fallback(on_command("cancel").handler(|| async { Outcome::Ended }))
//!     .build();
//!
//! dispatcher.add(order_flow);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{BoxError, Service};
use tracing::{debug, trace};

use crate::context::HandlerContext;
use crate::conversation::ConversationState;
use crate::matcher::Matcher;
use crate::outcome::Outcome;
use crate::pipeline::{HandlerDescriptor, Stage};

/// Builder for a [`Matcher`] that owns every route of conversation type `T`.
///
/// Conversations are keyed per user, like the
/// [`ConversationRegistry`](crate::ConversationRegistry) they live in. The
/// built matcher blocks later matchers whenever one of its routes handles the
/// event; call [`Matcher::block`] on the result to change that.
pub struct ConversationBuilder<T> {
    name: Option<String>,
    allow_reentry: bool,
    entry_points: Vec<Matcher>,
    steps: Vec<Matcher>,
    fallbacks: Vec<Matcher>,
    _state: PhantomData<fn() -> T>,
}

impl<T: ConversationState> Default for ConversationBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ConversationState> ConversationBuilder<T> {
    pub fn new() -> Self {
        Self {
            name: None,
            allow_reentry: false,
            entry_points: Vec::new(),
            steps: Vec::new(),
            fallbacks: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Names the flow in logs. Defaults to the type name of `T`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lets entry points restart an active conversation.
    pub fn allow_reentry(mut self, allow: bool) -> Self {
        self.allow_reentry = allow;
        self
    }

    /// Adds a route that starts the conversation.
    ///
    /// The route's check and pipelines are used; its `block` flag is not.
    pub fn entry_point(mut self, route: Matcher) -> Self {
        self.entry_points.push(route);
        self
    }

    /// Adds a route tried while the conversation is active.
    pub fn step(mut self, route: Matcher) -> Self {
        self.steps.push(route);
        self
    }

    /// Adds a route tried while the conversation is active and no step
    /// matched.
    pub fn fallback(mut self, route: Matcher) -> Self {
        self.fallbacks.push(route);
        self
    }

    /// Builds the matcher.
    pub fn build(self) -> Matcher {
        let name = self
            .name
            .unwrap_or_else(|| std::any::type_name::<T>().to_string());
        let stage = Stage::ConversationRouter {
            conversation: std::any::type_name::<T>(),
            routes: self.entry_points.len() + self.steps.len() + self.fallbacks.len(),
        };
        let routes = Arc::new(Routes::<T> {
            name: name.clone(),
            allow_reentry: self.allow_reentry,
            entry_points: self.entry_points,
            steps: self.steps,
            fallbacks: self.fallbacks,
            _state: PhantomData,
        });

        let gate = Arc::clone(&routes);
        Matcher::new()
            .name(format!("conversation:{name}"))
            .check(move |ctx| gate.select(ctx).is_some())
            .block(true)
            .service(HandlerDescriptor::from_service(
                vec![stage],
                ConversationRouter { routes },
            ))
    }
}

impl<T> fmt::Debug for ConversationBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationBuilder")
            .field("conversation", &std::any::type_name::<T>())
            .field("name", &self.name)
            .field("allow_reentry", &self.allow_reentry)
            .field("entry_points", &self.entry_points.len())
            .field("steps", &self.steps.len())
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteKind {
    Entry,
    Reentry,
    Step,
    Fallback,
}

impl RouteKind {
    fn as_str(self) -> &'static str {
        match self {
            RouteKind::Entry => "entry",
            RouteKind::Reentry => "reentry",
            RouteKind::Step => "step",
            RouteKind::Fallback => "fallback",
        }
    }
}

struct Routes<T> {
    name: String,
    allow_reentry: bool,
    entry_points: Vec<Matcher>,
    steps: Vec<Matcher>,
    fallbacks: Vec<Matcher>,
    _state: PhantomData<fn() -> T>,
}

fn first_match<'a>(routes: &'a [Matcher], ctx: &HandlerContext) -> Option<&'a Matcher> {
    routes.iter().find(|route| route.matches(ctx))
}

impl<T: ConversationState> Routes<T> {
    fn select(&self, ctx: &HandlerContext) -> Option<(RouteKind, &Matcher)> {
        if !ctx.user().conversations().contains::<T>() {
            return first_match(&self.entry_points, ctx).map(|r| (RouteKind::Entry, r));
        }
        if self.allow_reentry {
            if let Some(route) = first_match(&self.entry_points, ctx) {
                return Some((RouteKind::Reentry, route));
            }
        }
        first_match(&self.steps, ctx)
            .map(|r| (RouteKind::Step, r))
            .or_else(|| first_match(&self.fallbacks, ctx).map(|r| (RouteKind::Fallback, r)))
    }
}

/// The service behind a built conversation matcher.
struct ConversationRouter<T> {
    routes: Arc<Routes<T>>,
}

impl<T> Clone for ConversationRouter<T> {
    fn clone(&self) -> Self {
        Self {
            routes: Arc::clone(&self.routes),
        }
    }
}

impl<T: ConversationState> Service<Arc<HandlerContext>> for ConversationRouter<T> {
    type Response = Outcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Outcome, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<HandlerContext>) -> Self::Future {
        let routes = Arc::clone(&self.routes);
        Box::pin(async move {
            // State may have moved on since the matcher's check ran
            let Some((kind, route)) = routes.select(&ctx) else {
                trace!(conversation = %routes.name, "No conversation route matched");
                return Ok(Outcome::Skipped);
            };
            debug!(
                conversation = %routes.name,
                user_id = %ctx.user_id(),
                route = kind.as_str(),
                "Conversation route selected"
            );

            if kind == RouteKind::Reentry {
                let _guard = ctx.user().lock_conversations().await;
                ctx.user().conversations().discard::<T>();
                debug!(
                    conversation = %routes.name,
                    user_id = %ctx.user_id(),
                    "Conversation restarted"
                );
            }

            let outcome = route.run_pipelines(Arc::clone(&ctx)).await?;

            if outcome.is_ended() {
                let _guard = ctx.user().lock_conversations().await;
                if ctx.user().conversations().discard::<T>() {
                    debug!(
                        conversation = %routes.name,
                        user_id = %ctx.user_id(),
                        "Conversation ended"
                    );
                }
            }
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::conversation::Conversation;
    use crate::dispatcher::Dispatcher;
    use crate::extractor::Text;
    use crate::matcher_builders::{on_command, on_text};
    use crate::pipeline::Pipeline;
    use crate::testing::{RecordingMessenger, message};
    use parley_core::{BoxedMessenger, UserId};

    #[derive(Debug, Default)]
    struct Survey {
        answers: Vec<String>,
    }

    fn survey_flow(allow_reentry: bool) -> Matcher {
        ConversationBuilder::<Survey>::new()
            .name("survey")
            .allow_reentry(allow_reentry)
            .entry_point(
                on_command("survey").service(
                    Pipeline::new()
                        .init::<Survey>()
                        .handler(|| async { "How did we do?" }),
                ),
            )
            .step(
                on_text().service(Pipeline::new().inject::<Survey>().handler(
                    |survey: Conversation<Survey>, text: Text| async move {
                        let count = survey
                            .update(|s| {
                                s.answers.push(text.0.clone());
                                s.answers.len()
                            })
                            .await;
                        format!("Answer {count} saved")
                    },
                )),
            )
            .fallback(on_command("cancel").handler(|| async { Outcome::Ended }))
            .build()
    }

    fn messenger() -> (Arc<RecordingMessenger>, BoxedMessenger) {
        let recording = Arc::new(RecordingMessenger::new());
        (Arc::clone(&recording), recording)
    }

    #[test]
    fn test_built_matcher_is_named_and_blocking() {
        let matcher = survey_flow(false);
        assert_eq!(matcher.get_name(), Some("conversation:survey"));
        assert!(matcher.is_blocking());
        assert_eq!(matcher.handler_count(), 1);
    }

    #[tokio::test]
    async fn test_steps_only_run_inside_the_conversation() {
        let dispatcher = Dispatcher::default().with(survey_flow(false));
        let (recording, m) = messenger();

        assert!(!dispatcher.dispatch(message(1, 1, "great"), m.clone()).await);
        assert!(!dispatcher.dispatch(message(1, 1, "/cancel"), m.clone()).await);
        assert!(recording.sent_texts().is_empty());

        assert!(dispatcher.dispatch(message(1, 1, "/survey"), m.clone()).await);
        assert!(dispatcher.dispatch(message(1, 1, "great"), m.clone()).await);
        assert!(dispatcher.dispatch(message(1, 1, "fast"), m).await);

        assert_eq!(
            recording.sent_texts(),
            vec!["How did we do?", "Answer 1 saved", "Answer 2 saved"]
        );
        let survey = dispatcher
            .scopes()
            .user(UserId(1))
            .conversations()
            .get::<Survey>()
            .unwrap();
        assert_eq!(survey.update(|s| s.answers.clone()).await, vec!["great", "fast"]);
    }

    #[tokio::test]
    async fn test_fallback_ending_discards_conversation() {
        let dispatcher = Dispatcher::default().with(survey_flow(false));
        let (_, m) = messenger();
        let user = dispatcher.scopes().user(UserId(1));

        dispatcher.dispatch(message(1, 1, "/survey"), m.clone()).await;
        assert!(user.conversations().contains::<Survey>());

        assert!(dispatcher.dispatch(message(1, 1, "/cancel"), m.clone()).await);
        assert!(!user.conversations().contains::<Survey>());
        assert!(!dispatcher.dispatch(message(1, 1, "late answer"), m).await);
    }

    #[tokio::test]
    async fn test_entry_point_ignored_while_active_without_reentry() {
        let dispatcher = Dispatcher::default().with(survey_flow(false));
        let (recording, m) = messenger();

        dispatcher.dispatch(message(1, 1, "/survey"), m.clone()).await;
        dispatcher.dispatch(message(1, 1, "great"), m.clone()).await;
        assert!(!dispatcher.dispatch(message(1, 1, "/survey"), m).await);

        assert_eq!(recording.sent_texts().len(), 2);
        let user = dispatcher.scopes().user(UserId(1));
        let survey = user.conversations().get::<Survey>().unwrap();
        assert_eq!(survey.update(|s| s.answers.len()).await, 1);
    }

    #[tokio::test]
    async fn test_reentry_restarts_conversation() {
        let dispatcher = Dispatcher::default().with(survey_flow(true));
        let (recording, m) = messenger();
        let user = dispatcher.scopes().user(UserId(1));

        dispatcher.dispatch(message(1, 1, "/survey"), m.clone()).await;
        dispatcher.dispatch(message(1, 1, "great"), m.clone()).await;
        let first = user.conversations().get::<Survey>().unwrap();

        assert!(dispatcher.dispatch(message(1, 1, "/survey"), m).await);

        let second = user.conversations().get::<Survey>().unwrap();
        assert!(!first.ptr_eq(&second));
        assert!(second.update(|s| s.answers.is_empty()).await);
        assert_eq!(
            recording.sent_texts().last().map(String::as_str),
            Some("How did we do?")
        );
    }

    #[tokio::test]
    async fn test_conversation_blocks_later_matchers() {
        let late = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&late);
        let dispatcher = Dispatcher::default()
            .with(survey_flow(false))
            .with(on_text().handler(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }));
        let (_, m) = messenger();

        dispatcher.dispatch(message(1, 1, "before"), m.clone()).await;
        assert_eq!(late.load(Ordering::SeqCst), 1);

        dispatcher.dispatch(message(1, 1, "/survey"), m.clone()).await;
        dispatcher.dispatch(message(1, 1, "during"), m).await;
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_users_have_separate_flows() {
        let dispatcher = Dispatcher::default().with(survey_flow(false));
        let (_, m) = messenger();

        dispatcher.dispatch(message(1, 1, "/survey"), m.clone()).await;
        assert!(!dispatcher.dispatch(message(1, 2, "great"), m).await);
        assert!(
            !dispatcher
                .scopes()
                .user(UserId(2))
                .conversations()
                .contains::<Survey>()
        );
    }
}
