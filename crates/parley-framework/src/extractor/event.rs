use std::ops::Deref;

use crate::context::HandlerContext;
use crate::error::{ExtractError, ExtractResult};
use crate::extractor::FromContext;
use parley_core::EventKind;

/// The text of a message event.
///
/// Fails on callback events and on messages without text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(pub String);

impl Deref for Text {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromContext for Text {
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
        let event = ctx.event();
        if event.kind() != EventKind::Message {
            return Err(ExtractError::EventKindMismatch {
                expected: EventKind::Message,
                got: event.kind(),
            });
        }
        event
            .text()
            .map(|t| Text(t.to_string()))
            .ok_or(ExtractError::MissingText)
    }
}

/// The argument string following a bot command.
///
/// For `/add_item rye bread` this is `"rye bread"`; for a bare `/start_order`
/// it is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs(pub String);

impl Deref for CommandArgs {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromContext for CommandArgs {
    fn from_context(ctx: &HandlerContext) -> ExtractResult<Self> {
        ctx.event()
            .command()
            .map(|(_, args)| CommandArgs(args.to_string()))
            .ok_or_else(|| ExtractError::custom("event is not a bot command"))
    }
}
