use crate::context::HandlerContext;
use crate::conversation::{Conversation, ConversationState};
use crate::error::{ExtractError, ExtractResult};
use crate::extractor::FromContext;

/// Extracts the conversation injected by the pipeline's lifecycle stage.
///
/// Deliberately does not fall back to the registry: a handler asking for a
/// `Conversation<T>` must be registered with an `init`, `inject` or `cleanup`
/// stage for `T`, otherwise the call fails with
/// [`ExtractError::ConversationNotInjected`].
impl<T: ConversationState> FromContext for Conversation<T> {
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
        ctx.injected::<Conversation<T>>()
            .ok_or(ExtractError::ConversationNotInjected {
                conversation: std::any::type_name::<T>(),
            })
    }
}
