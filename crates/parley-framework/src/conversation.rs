//! Per-user conversation state.
//!
//! A conversation is a multi-step flow whose intermediate progress lives in a
//! typed state value. The state type itself is the conversation's identity:
//! a user has at most one live `OrderRequest`, one live `Survey`, and so on.
//!
//! The [`ConversationRegistry`] owned by each [`UserScope`](crate::scope::UserScope)
//! provides the three lifecycle primitives:
//!
//! | Operation | Absent | Present |
//! |-----------|--------|---------|
//! | [`initialize`](ConversationRegistry::initialize) | stores `T::default()` | `Conflict`, existing instance untouched |
//! | [`get`](ConversationRegistry::get) | `NotFound` | shared handle |
//! | [`discard`](ConversationRegistry::discard) | no-op, `false` | removed, `true` |
//!
//! Handlers normally do not call these directly; the pipeline's lifecycle
//! stage does, and injects a [`Conversation<T>`] handle into the handler.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::debug;

use crate::error::{ConversationError, ConversationResult};
use parley_core::UserId;

/// Types usable as conversation state.
///
/// Blanket-implemented for every `Default + Send + 'static` type; the default
/// value is the state a freshly initialized conversation starts from.
pub trait ConversationState: Default + Send + 'static {}

impl<T: Default + Send + 'static> ConversationState for T {}

// =============================================================================
// Conversation<T>
// =============================================================================

/// Shared handle to a live conversation state.
///
/// Cloning the handle does not clone the state; every clone refers to the
/// instance stored in the registry. The state sits behind an async mutex, so
/// the guard may be held across `.await` points inside a handler.
pub struct Conversation<T> {
    state: Arc<AsyncMutex<T>>,
}

impl<T> Clone for Conversation<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> Conversation<T> {
    fn new(value: T) -> Self {
        Self {
            state: Arc::new(AsyncMutex::new(value)),
        }
    }

    /// Locks the state for reading or writing.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock().await
    }

    /// Applies `f` to the state and returns its result.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.state.lock().await;
        f(&mut guard)
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.state.lock().await.clone()
    }

    /// Returns `true` if both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<T> fmt::Debug for Conversation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("state", &std::any::type_name::<T>())
            .finish()
    }
}

// =============================================================================
// ConversationRegistry
// =============================================================================

struct Slot {
    name: &'static str,
    /// Always a `Conversation<T>` where `TypeId::of::<T>()` is the slot's key.
    handle: Box<dyn Any + Send + Sync>,
}

/// Mapping from conversation type to the user's live instance of it.
pub struct ConversationRegistry {
    user_id: UserId,
    slots: Mutex<HashMap<TypeId, Slot>>,
}

impl ConversationRegistry {
    pub(crate) fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a conversation of type `T` from `T::default()`.
    ///
    /// # Errors
    ///
    /// [`ConversationError::Conflict`] if a `T` is already active. The active
    /// instance is left as it was.
    pub fn initialize<T: ConversationState>(&self) -> ConversationResult<Conversation<T>> {
        use std::collections::hash_map::Entry;

        let name = std::any::type_name::<T>();
        match self.slots.lock().entry(TypeId::of::<T>()) {
            Entry::Occupied(_) => Err(ConversationError::Conflict {
                conversation: name,
                user_id: self.user_id,
            }),
            Entry::Vacant(slot) => {
                let conversation = Conversation::new(T::default());
                slot.insert(Slot {
                    name,
                    handle: Box::new(conversation.clone()),
                });
                debug!(user_id = %self.user_id, conversation = name, "Conversation initialized");
                Ok(conversation)
            }
        }
    }

    /// Returns the active conversation of type `T`.
    ///
    /// # Errors
    ///
    /// [`ConversationError::NotFound`] if no `T` is active.
    pub fn get<T: ConversationState>(&self) -> ConversationResult<Conversation<T>> {
        self.slots
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.handle.downcast_ref::<Conversation<T>>())
            .cloned()
            .ok_or(ConversationError::NotFound {
                conversation: std::any::type_name::<T>(),
                user_id: self.user_id,
            })
    }

    /// Ends the conversation of type `T`.
    ///
    /// Idempotent: returns `false` and does nothing if no `T` is active.
    /// Outstanding [`Conversation<T>`] handles keep the old state alive but it
    /// can no longer be reached through the registry.
    pub fn discard<T: 'static>(&self) -> bool {
        self.discard_by_id(TypeId::of::<T>())
    }

    pub(crate) fn discard_by_id(&self, type_id: TypeId) -> bool {
        match self.slots.lock().remove(&type_id) {
            Some(slot) => {
                debug!(user_id = %self.user_id, conversation = slot.name, "Conversation discarded");
                true
            }
            None => false,
        }
    }

    /// Returns `true` if a conversation of type `T` is active.
    pub fn contains<T: 'static>(&self) -> bool {
        self.slots.lock().contains_key(&TypeId::of::<T>())
    }

    /// Returns the type names of all active conversations, sorted.
    pub fn active(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.slots.lock().values().map(|s| s.name).collect();
        names.sort_unstable();
        names
    }

    /// Ends every active conversation, returning how many were removed.
    pub fn clear(&self) -> usize {
        let removed = self.slots.lock().drain().count();
        if removed > 0 {
            debug!(user_id = %self.user_id, removed, "All conversations discarded");
        }
        removed
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl fmt::Debug for ConversationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationRegistry")
            .field("user_id", &self.user_id)
            .field("active", &self.active())
            .finish()
    }
}
