//! Isolation scopes for application state.
//!
//! Mutable application state is partitioned into three scopes:
//!
//! - [`GlobalScope`]: one per [`ScopeStore`], lives as long as the store.
//! - [`ChatScope`]: one per [`ChatId`], created on first reference.
//! - [`UserScope`]: one per [`UserId`], created on first reference. It also
//!   owns the user's [`ConversationRegistry`].
//!
//! Each scope carries a [`StateMap`], a heterogeneous map keyed by the stored
//! value's type. The [`ScopeStore`] is constructed once at startup and handed
//! to the dispatcher; resolving the same identity always yields the same
//! `Arc`, and two different identities never share a scope object.
//!
//! Scopes are in-memory only and are never torn down. A bot that sees an
//! unbounded number of chats grows the store without bound.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = ScopeStore::new();
//! let user = store.user(UserId(42));
//! user.state().insert(Locale("en".into()));
//! assert!(store.user(UserId(42)).state().contains::<Locale>());
//! assert!(!store.user(UserId(7)).state().contains::<Locale>());
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use crate::conversation::ConversationRegistry;
use parley_core::{ChatId, InboundEvent, UserId};

// =============================================================================
// StateMap
// =============================================================================

/// A type-keyed map of application state.
///
/// Only one value per type can be stored; use newtypes to store several
/// values of the same underlying type. The internal lock is never held across
/// an `.await`, so closures passed to [`update`](Self::update) must be
/// synchronous.
#[derive(Default)]
pub struct StateMap {
    entries: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.entries
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Returns a clone of the stored `T`.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.entries
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Returns `true` if a `T` is stored.
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the stored `T`.
    pub fn remove<T: 'static>(&self) -> Option<T> {
        self.entries
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Mutates the stored `T` in place. Returns `None` if no `T` is stored.
    pub fn update<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.entries
            .lock()
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
            .map(f)
    }

    /// Returns a clone of the stored `T`, storing `init()` first if absent.
    pub fn get_or_insert_with<T: Clone + Send + Sync + 'static>(
        &self,
        init: impl FnOnce() -> T,
    ) -> T {
        let mut entries = self.entries.lock();
        if let Some(value) = entries
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
        {
            return value.clone();
        }
        let value = init();
        entries.insert(TypeId::of::<T>(), Box::new(value.clone()));
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for StateMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMap")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// Scopes
// =============================================================================

/// Process-wide state, shared by every event.
#[derive(Debug, Default)]
pub struct GlobalScope {
    state: StateMap,
}

impl GlobalScope {
    pub fn state(&self) -> &StateMap {
        &self.state
    }
}

/// State belonging to a single chat.
#[derive(Debug)]
pub struct ChatScope {
    chat_id: ChatId,
    state: StateMap,
}

impl ChatScope {
    fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            state: StateMap::new(),
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn state(&self) -> &StateMap {
        &self.state
    }
}

/// State belonging to a single user, including their active conversations.
pub struct UserScope {
    user_id: UserId,
    state: StateMap,
    conversations: ConversationRegistry,
    /// Serializes lifecycle-bearing pipelines of this user.
    conversation_guard: Arc<AsyncMutex<()>>,
}

impl UserScope {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            state: StateMap::new(),
            conversations: ConversationRegistry::new(user_id),
            conversation_guard: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> &StateMap {
        &self.state
    }

    /// Returns the user's conversation registry.
    pub fn conversations(&self) -> &ConversationRegistry {
        &self.conversations
    }

    /// Waits for exclusive access to this user's conversation lifecycle.
    ///
    /// The guard is held by the pipeline's conversation guard stage for the
    /// whole lifecycle + callback + cleanup sequence, so two dispatches of the
    /// same user can never interleave `initialize`, `get` and `discard`.
    pub async fn lock_conversations(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.conversation_guard).lock_owned().await
    }
}

impl fmt::Debug for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserScope")
            .field("user_id", &self.user_id)
            .field("state", &self.state)
            .field("conversations", &self.conversations)
            .finish_non_exhaustive()
    }
}

/// The scope objects addressable from one event.
#[derive(Debug, Clone)]
pub struct Scopes {
    pub global: Arc<GlobalScope>,
    pub chat: Arc<ChatScope>,
    pub user: Arc<UserScope>,
}

// =============================================================================
// ScopeStore
// =============================================================================

/// Owner of every scope object.
///
/// Construct one at startup and pass it to the
/// [`Dispatcher`](crate::dispatcher::Dispatcher). Lookups are idempotent and
/// allocate on first reference.
#[derive(Default)]
pub struct ScopeStore {
    global: Arc<GlobalScope>,
    chats: RwLock<HashMap<ChatId, Arc<ChatScope>>>,
    users: RwLock<HashMap<UserId, Arc<UserScope>>>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the global scope.
    pub fn global(&self) -> Arc<GlobalScope> {
        Arc::clone(&self.global)
    }

    /// Returns the scope of `chat_id`, creating it on first reference.
    pub fn chat(&self, chat_id: ChatId) -> Arc<ChatScope> {
        if let Some(scope) = self.chats.read().get(&chat_id) {
            return Arc::clone(scope);
        }
        let mut chats = self.chats.write();
        let scope = chats.entry(chat_id).or_insert_with(|| {
            trace!(%chat_id, "Allocating chat scope");
            Arc::new(ChatScope::new(chat_id))
        });
        Arc::clone(scope)
    }

    /// Returns the scope of `user_id`, creating it on first reference.
    pub fn user(&self, user_id: UserId) -> Arc<UserScope> {
        if let Some(scope) = self.users.read().get(&user_id) {
            return Arc::clone(scope);
        }
        let mut users = self.users.write();
        let scope = users.entry(user_id).or_insert_with(|| {
            trace!(%user_id, "Allocating user scope");
            Arc::new(UserScope::new(user_id))
        });
        Arc::clone(scope)
    }

    /// Resolves the three scopes addressable from `event`.
    pub fn resolve(&self, event: &InboundEvent) -> Scopes {
        Scopes {
            global: self.global(),
            chat: self.chat(event.chat_id),
            user: self.user(event.user_id),
        }
    }

    /// Returns the number of chat scopes allocated so far.
    pub fn chat_count(&self) -> usize {
        self.chats.read().len()
    }

    /// Returns the number of user scopes allocated so far.
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }
}

impl fmt::Debug for ScopeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeStore")
            .field("chat_count", &self.chat_count())
            .field("user_count", &self.user_count())
            .finish()
    }
}
