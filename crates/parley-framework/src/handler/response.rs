use async_trait::async_trait;
use tower::BoxError;
use tracing::error;

use crate::context::HandlerContext;
use crate::outcome::Outcome;

/// A trait for types that can be returned from handlers.
///
/// The response decides the pipeline [`Outcome`] and performs any side effect
/// (such as replying to the chat). Returning `Err` hands the failure to the
/// enclosing stages.
#[async_trait]
pub trait HandlerResponse: Send + 'static {
    /// Process the handler response.
    async fn process_response(self, ctx: &HandlerContext) -> Result<Outcome, BoxError>;
}

/// Implementation for `()` - no response needed.
#[async_trait]
impl HandlerResponse for () {
    async fn process_response(self, _ctx: &HandlerContext) -> Result<Outcome, BoxError> {
        Ok(Outcome::Handled)
    }
}

/// Explicit outcome, e.g. a handler that decides on its own that a flow ended.
#[async_trait]
impl HandlerResponse for Outcome {
    async fn process_response(self, _ctx: &HandlerContext) -> Result<Outcome, BoxError> {
        Ok(self)
    }
}

/// Implementation for `String` - send it to the event's chat.
///
/// A failed send is logged, not propagated: the business work already
/// happened.
#[async_trait]
impl HandlerResponse for String {
    async fn process_response(self, ctx: &HandlerContext) -> Result<Outcome, BoxError> {
        if let Err(e) = ctx.messenger().send_message(ctx.chat_id(), &self).await {
            error!(chat_id = %ctx.chat_id(), "Failed to send message: {e}");
        }
        Ok(Outcome::Handled)
    }
}

#[async_trait]
impl HandlerResponse for &'static str {
    async fn process_response(self, ctx: &HandlerContext) -> Result<Outcome, BoxError> {
        self.to_string().process_response(ctx).await
    }
}

/// Implementation for `Option<T>` where T implements HandlerResponse.
///
/// On Some, the inner value's response is handled. On None, no action is taken.
#[async_trait]
impl<T: HandlerResponse> HandlerResponse for Option<T> {
    async fn process_response(self, ctx: &HandlerContext) -> Result<Outcome, BoxError> {
        match self {
            Some(t) => t.process_response(ctx).await,
            None => Ok(Outcome::Handled),
        }
    }
}

/// Implementation for `Result<T, E>` where T implements HandlerResponse.
///
/// On Ok, the inner value's response is handled. On Err, the error is handed
/// to the enclosing pipeline stages.
#[async_trait]
impl<T, E> HandlerResponse for Result<T, E>
where
    T: HandlerResponse,
    E: Into<BoxError> + Send + 'static,
{
    async fn process_response(self, ctx: &HandlerContext) -> Result<Outcome, BoxError> {
        match self {
            Ok(t) => t.process_response(ctx).await,
            Err(e) => Err(e.into()),
        }
    }
}
