use std::ops::Deref;
use std::sync::Arc;

use crate::context::HandlerContext;
use crate::error::{ExtractError, ExtractResult};
use crate::extractor::FromContext;
use crate::scope::{ChatScope, GlobalScope, UserScope};

macro_rules! scope_extractor {
    ($(#[$meta:meta])* $name:ident => $scope:ty, $accessor:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub Arc<$scope>);

        impl Deref for $name {
            type Target = $scope;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl FromContext for $name {
            fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
                Ok($name(Arc::clone(ctx.$accessor())))
            }
        }
    };
}

scope_extractor! {
    /// The global scope.
    Global => GlobalScope, global
}

scope_extractor! {
    /// The scope of the event's chat.
    Chat => ChatScope, chat
}

scope_extractor! {
    /// The scope of the event's user.
    User => UserScope, user
}

/// A clone of a `T` stored in the global scope.
///
/// Typically used for long-lived collaborators such as repositories, stored
/// once at startup:
///
/// ```rust,ignore
/// scopes.global().state().insert(orders.clone()); // Arc<MemoryRepository<Order>>
///
/// async fn file_order(orders: Shared<Arc<MemoryRepository<Order>>>) { ... }
/// ```
#[derive(Debug, Clone)]
pub struct Shared<T>(pub T);

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Clone + 'static> FromContext for Shared<T> {
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
        ctx.global()
            .state()
            .get::<T>()
            .map(Shared)
            .ok_or(ExtractError::SharedStateMissing {
                state: std::any::type_name::<T>(),
            })
    }
}
