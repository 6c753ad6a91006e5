/// The result of running a pipeline to completion.
///
/// Failures are not an outcome: they travel as `Err(BoxError)` until an error
/// boundary converts them into [`Outcome::Ended`] or they reach the
/// dispatcher's error hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Outcome {
    /// The business callback ran and the flow continues.
    #[default]
    Handled,
    /// The conversation reached a terminal state, either through a cleanup
    /// stage or because an error boundary force-terminated it.
    Ended,
    /// The pipeline declined the event (e.g. authorization denied). No state
    /// was touched and no side effects fired.
    Skipped,
}

impl Outcome {
    /// Returns `true` if the business callback was not reached.
    pub fn is_skipped(self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    /// Returns `true` if the conversation was terminated.
    pub fn is_ended(self) -> bool {
        matches!(self, Outcome::Ended)
    }
}
