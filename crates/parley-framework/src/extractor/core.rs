use crate::context::HandlerContext;
use crate::error::ExtractResult;
use parley_core::{BoxedMessenger, InboundEvent};

/// A trait for types that can be extracted from a [`HandlerContext`].
///
/// This is the core abstraction behind handler parameter injection. Types
/// implementing this trait can be used directly as handler function
/// parameters.
///
/// # Error Handling
///
/// Extraction fails (returning `Err`) if the required data is not available
/// in the context. The handler is then not invoked and the error propagates
/// through the pipeline.
pub trait FromContext: Sized {
    /// Attempts to extract this type from the given context.
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self>;
}

/// Extracts a clone of the inbound event.
impl FromContext for InboundEvent {
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
        Ok(ctx.event().clone())
    }
}

/// Implementation for `Option<T>` where `T: FromContext`.
///
/// This allows handlers to have optional parameters that may or may not
/// be extractable from the context.
impl<T: FromContext> FromContext for Option<T> {
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
        Ok(T::from_context(ctx).ok())
    }
}

/// Extracts the messenger, for handlers that send more than a single reply:
///
/// ```rust,ignore
/// async fn announce(messenger: BoxedMessenger, event: InboundEvent) {
///     messenger.send_message(event.chat_id, "Working on it...").await.ok();
/// }
/// ```
impl FromContext for BoxedMessenger {
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
        Ok(ctx.messenger_arc())
    }
}
