//! Persistence collaborator interface.
//!
//! Scopes and conversations are in-memory only. Anything that must survive a
//! restart is written explicitly by a business callback through a
//! [`Repository`]. The framework itself never calls this interface.
//!
//! [`MemoryRepository`] is a non-durable implementation meant for demos and
//! tests; production deployments plug in a real document store.

use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tracing::trace;

use crate::error::{RepositoryError, RepositoryResult};

/// A durably identified entity.
pub trait Entity: Clone + Send + Sync + 'static {
    /// The identity type of the entity.
    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Returns the entity's id.
    fn id(&self) -> &Self::Id;
}

/// Asynchronous CRUD surface over entities of type `E`.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Stores a new entity. Fails with [`RepositoryError::Duplicate`] if the id is taken.
    async fn insert(&self, entity: E) -> RepositoryResult<()>;

    /// Replaces a stored entity. Fails with [`RepositoryError::NotFound`] if absent.
    async fn update(&self, entity: E) -> RepositoryResult<()>;

    /// Looks up an entity by id.
    async fn find_by_id(&self, id: &E::Id) -> RepositoryResult<Option<E>>;

    /// Returns a lazy stream over all stored entities.
    ///
    /// Every call starts a fresh pass over the collection.
    fn list(&self) -> BoxStream<'_, RepositoryResult<E>>;

    /// Returns `true` if an entity with `id` is stored.
    async fn exists(&self, id: &E::Id) -> RepositoryResult<bool>;
}

/// In-memory [`Repository`] preserving insertion order.
#[derive(Debug)]
pub struct MemoryRepository<E: Entity> {
    items: RwLock<Vec<E>>,
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }

    /// Returns the number of stored entities.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn insert(&self, entity: E) -> RepositoryResult<()> {
        let mut items = self.items.write();
        if items.iter().any(|e| e.id() == entity.id()) {
            return Err(RepositoryError::Duplicate {
                id: format!("{:?}", entity.id()),
            });
        }
        trace!(id = ?entity.id(), "Inserting entity");
        items.push(entity);
        Ok(())
    }

    async fn update(&self, entity: E) -> RepositoryResult<()> {
        let mut items = self.items.write();
        match items.iter_mut().find(|e| e.id() == entity.id()) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                id: format!("{:?}", entity.id()),
            }),
        }
    }

    async fn find_by_id(&self, id: &E::Id) -> RepositoryResult<Option<E>> {
        Ok(self.items.read().iter().find(|e| e.id() == id).cloned())
    }

    fn list(&self) -> BoxStream<'_, RepositoryResult<E>> {
        let snapshot = self.items.read().clone();
        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }

    async fn exists(&self, id: &E::Id) -> RepositoryResult<bool> {
        Ok(self.items.read().iter().any(|e| e.id() == id))
    }
}
