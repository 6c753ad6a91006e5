use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::context::HandlerContext;
use crate::error::{ExtractError, ExtractResult};
use crate::extractor::FromContext;
use parley_core::{CallbackId, EventKind};

/// Typed view of an inline callback payload.
///
/// Derefs to the payload. Extraction checks the payload's runtime type and
/// fails with [`ExtractError::PayloadTypeMismatch`] rather than handing out a
/// wrongly typed value when a dispatch pattern is misconfigured.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Debug)]
/// struct AddItem(String);
///
/// async fn add_item(item: Callback<AddItem>, order: Conversation<OrderRequest>) {
///     order.update(|o| o.items.push(item.0.clone())).await;
/// }
/// ```
pub struct Callback<T> {
    id: CallbackId,
    payload: Arc<T>,
}

impl<T> Callback<T> {
    /// Returns the id of the callback query.
    pub fn id(&self) -> &CallbackId {
        &self.id
    }

    /// Returns the shared payload.
    pub fn into_inner(self) -> Arc<T> {
        self.payload
    }
}

impl<T> Deref for Callback<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.payload
    }
}

impl<T: fmt::Debug> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .finish()
    }
}

impl<T: Any + Send + Sync> FromContext for Callback<T> {
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
        let event = ctx.event();
        let query = event
            .callback
            .as_ref()
            .ok_or(ExtractError::EventKindMismatch {
                expected: EventKind::Callback,
                got: event.kind(),
            })?;
        let payload = query
            .downcast::<T>()
            .ok_or_else(|| ExtractError::PayloadTypeMismatch {
                expected: std::any::type_name::<T>(),
                got: query.payload_type_name(),
            })?;
        Ok(Callback {
            id: query.id().clone(),
            payload,
        })
    }
}
