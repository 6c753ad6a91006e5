//! Matcher system for the Parley framework.
//!
//! A [`Matcher`] groups one or more handler pipelines under a common "check"
//! rule. Only when the check passes are the pipelines executed.
//!
//! The matcher is responsible for:
//! - Checking if the event matches certain criteria
//! - Running its pipelines in order
//! - Controlling whether to block further matchers (via `block` setting)
//!
//! # Example
//!
//! ```rust,ignore
//! // Plain handler, no stages
//! let help = on_command("help").handler(help);
//!
//! // Handler with a composed pipeline
//! let add = on_callback::<AddItem>()
//!     .block(true)
//!     .service(Pipeline::new().callback::<AddItem>().inject::<OrderRequest>().handler(add_item));
//!
//! // Free text, only while an order is being collected
//! let note = on_text().in_conversation::<OrderRequest>().handler(add_note);
//! ```

use std::sync::Arc;

use tower::BoxError;
use tracing::{debug, trace};

use crate::context::HandlerContext;
use crate::conversation::ConversationState;
use crate::handler::Handler;
use crate::outcome::Outcome;
use crate::pipeline::HandlerDescriptor;

/// A type-erased check function.
pub type CheckFn = Arc<dyn Fn(&HandlerContext) -> bool + Send + Sync>;

#[derive(Clone)]
struct MatcherInner {
    /// The check function that determines if this matcher should process the event.
    check_fn: Option<CheckFn>,

    /// The pipelines to execute when the check passes.
    handlers: Vec<HandlerDescriptor>,

    /// Whether to block further matchers after this one processes the event.
    block: bool,

    /// Optional name for debugging.
    name: Option<String>,
}

/// A matcher that groups handler pipelines with a common check rule.
///
/// Pipelines within a matcher are executed sequentially when the check
/// passes. The first pipeline error stops the matcher and is returned to the
/// dispatcher.
///
/// `Matcher` uses an internal `Arc`, so cloning is cheap.
#[derive(Clone)]
pub struct Matcher {
    inner: Arc<MatcherInner>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    /// Creates a new empty matcher.
    ///
    /// By default, a matcher with no check will match all events.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MatcherInner {
                check_fn: None,
                handlers: Vec::new(),
                block: false,
                name: None,
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut MatcherInner {
        Arc::make_mut(&mut self.inner)
    }

    /// Sets a name for this matcher (useful for debugging).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner_mut().name = Some(name.into());
        self
    }

    /// Sets a custom check function, replacing any previous one.
    pub fn check<F>(mut self, f: F) -> Self
    where
        F: Fn(&HandlerContext) -> bool + Send + Sync + 'static,
    {
        self.inner_mut().check_fn = Some(Arc::new(f));
        self
    }

    /// Adds a check that must pass in addition to the current one.
    pub fn and<F>(mut self, f: F) -> Self
    where
        F: Fn(&HandlerContext) -> bool + Send + Sync + 'static,
    {
        let combined: CheckFn = match self.inner.check_fn.clone() {
            Some(prev) => Arc::new(move |ctx| prev(ctx) && f(ctx)),
            None => Arc::new(f),
        };
        self.inner_mut().check_fn = Some(combined);
        self
    }

    /// Only match while the user has an active conversation of type `T`.
    pub fn in_conversation<T: ConversationState>(self) -> Self {
        self.and(|ctx| ctx.user().conversations().contains::<T>())
    }

    /// Sets whether this matcher blocks further matchers.
    ///
    /// When `block` is `true`, if this matcher's check passes and a pipeline
    /// handles the event, no further matchers will process it.
    pub fn block(mut self, block: bool) -> Self {
        self.inner_mut().block = block;
        self
    }

    /// Adds a handler without any pipeline stages.
    pub fn handler<H, T>(self, handler: H) -> Self
    where
        H: Handler<T>,
        T: Send + 'static,
    {
        self.service(HandlerDescriptor::new(handler))
    }

    /// Adds a composed pipeline.
    pub fn service(mut self, descriptor: HandlerDescriptor) -> Self {
        self.inner_mut().handlers.push(descriptor);
        self
    }

    /// Checks if this matcher should process the given event.
    pub fn matches(&self, ctx: &HandlerContext) -> bool {
        match &self.inner.check_fn {
            Some(f) => f(ctx),
            None => true,
        }
    }

    /// Returns whether this matcher blocks further matchers.
    pub fn is_blocking(&self) -> bool {
        self.inner.block
    }

    /// Returns the number of pipelines in this matcher.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Returns the name of this matcher, if set.
    pub fn get_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Executes all pipelines in this matcher.
    ///
    /// Returns `Ok(true)` if at least one pipeline handled the event, and
    /// `Ok(false)` if the check failed or every pipeline skipped it (e.g. the
    /// user was not authorized).
    pub async fn execute(&self, ctx: Arc<HandlerContext>) -> Result<bool, BoxError> {
        let name = self.inner.name.as_deref().unwrap_or("unnamed");
        if !self.matches(&ctx) {
            trace!(matcher = name, "Matcher check failed, skipping");
            return Ok(false);
        }

        debug!(
            matcher = name,
            handler_count = self.inner.handlers.len(),
            "Matcher check passed, executing pipelines"
        );

        let outcome = self.run_pipelines(ctx).await?;
        Ok(!outcome.is_skipped())
    }

    /// Runs every pipeline without consulting the check.
    ///
    /// The combined outcome is `Ended` if any pipeline ended the
    /// conversation, `Handled` if any pipeline ran, and `Skipped` otherwise.
    pub(crate) async fn run_pipelines(
        &self,
        ctx: Arc<HandlerContext>,
    ) -> Result<Outcome, BoxError> {
        let name = self.inner.name.as_deref().unwrap_or("unnamed");
        let mut combined = Outcome::Skipped;
        for (i, descriptor) in self.inner.handlers.iter().enumerate() {
            trace!(matcher = name, handler_index = i, "Executing pipeline");
            combined = match (combined, descriptor.call(Arc::clone(&ctx)).await?) {
                (Outcome::Ended, _) | (_, Outcome::Ended) => Outcome::Ended,
                (Outcome::Handled, _) | (_, Outcome::Handled) => Outcome::Handled,
                _ => Outcome::Skipped,
            };
        }
        Ok(combined)
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("name", &self.inner.name)
            .field("block", &self.inner.block)
            .field("handler_count", &self.inner.handlers.len())
            .finish()
    }
}
