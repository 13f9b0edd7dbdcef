use thiserror::Error;

/// Errors raised by the library itself, as opposed to the errors a payload
/// chooses to report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A promise was resolved with itself.
    #[error("chaining cycle detected: a promise cannot be resolved with itself")]
    SelfResolution,

    /// A listener-style future aborted and was observed through a promise.
    #[error("operation aborted: {0}")]
    Aborted(String),

    /// A combinator was constructed without any steps.
    #[error("at least one step is required")]
    NoSteps,

    /// A parallel step reported completion after every step had finished.
    #[error("no pending steps")]
    NoPendingSteps,
}
