//! Matcher builder functions for common event patterns.
//!
//! # Example
//!
//! ```rust,ignore
//! dispatcher
//!     .with(on_command("start_order").service(start_order))
//!     .with(on_callback::<AddItem>().service(add_item))
//!     .with(on_text().in_conversation::<OrderRequest>().handler(add_note))
//!     .with(on_event().handler(log_event));
//! ```

use std::any::Any;

use crate::matcher::Matcher;
use parley_core::EventKind;

/// Creates a matcher that handles every event.
pub fn on_event() -> Matcher {
    Matcher::new().name("event")
}

/// Creates a matcher that only handles message events.
pub fn on_message() -> Matcher {
    Matcher::new()
        .name("message")
        .check(|ctx| ctx.event().kind() == EventKind::Message)
}

/// Creates a matcher for text messages that are not bot commands.
pub fn on_text() -> Matcher {
    Matcher::new().name("text").check(|ctx| {
        let event = ctx.event();
        event.text().is_some() && event.command().is_none()
    })
}

/// Creates a matcher for the bot command `/name`.
///
/// The match ignores a `@bot_name` suffix and any arguments; use
/// [`CommandArgs`](crate::extractor::CommandArgs) to read the latter.
///
/// # Example
///
/// ```rust,ignore
/// let matcher = on_command("add_item")
///     .handler(|args: CommandArgs| async move { format!("Adding {}", &*args) });
/// ```
pub fn on_command(name: impl Into<String>) -> Matcher {
    let name = name.into();
    Matcher::new()
        .name(format!("command:{name}"))
        .check(move |ctx| {
            ctx.event()
                .command()
                .is_some_and(|(command, _)| command == name)
        })
}

/// Creates a matcher for callback queries whose payload is a `T`.
pub fn on_callback<T: Any>() -> Matcher {
    Matcher::new()
        .name(format!("callback:{}", std::any::type_name::<T>()))
        .check(|ctx| {
            ctx.event()
                .callback
                .as_ref()
                .is_some_and(|query| query.payload_is::<T>())
        })
}
