//! # Parley Core
//!
//! Foundation types shared by every Parley crate:
//!
//! - [`id`]: strongly typed chat, user, message and callback identifiers
//! - [`event`]: the [`InboundEvent`] record delivered by an event source
//! - [`messenger`]: the [`Messenger`] capability used for outbound side effects
//! - [`persistence`]: the [`Repository`] interface business callbacks may use
//! - [`error`]: error types for the collaborator interfaces
//!
//! Nothing in this crate knows about scopes, conversations or pipelines; those
//! live in `parley-framework`.

pub mod error;
pub mod event;
pub mod id;
pub mod messenger;
pub mod persistence;

pub use error::{ApiError, ApiResult, RepositoryError, RepositoryResult};
pub use event::{CallbackPayload, CallbackQuery, EventKind, InboundEvent};
pub use id::{CallbackId, ChatId, MessageId, UserId};
pub use messenger::{BoxedMessenger, Messenger};
pub use persistence::{Entity, MemoryRepository, Repository};
