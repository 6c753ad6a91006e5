//! Identifier newtypes.
//!
//! Chat, user and message identities are plain integers on every platform we
//! care about, but mixing them up is an easy mistake; scopes are keyed by
//! these types so a `UserId` can never address a chat partition.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw integer value.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

integer_id! {
    /// Identity of a chat (private conversation, group or channel).
    ChatId
}

integer_id! {
    /// Identity of a user.
    UserId
}

integer_id! {
    /// Identity of a message within its chat.
    MessageId
}

/// Identity of an inline callback query, used to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub String);

impl CallbackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallbackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallbackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
