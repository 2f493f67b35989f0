//! Error types for the coroutine runtime

use thiserror::Error;

/// Main error type for the runtime.
///
/// A step that fails stops its coroutine; the error is recorded on the
/// coroutine as its stop reason and can be read back with
/// [`Coroutine::fault`](crate::Coroutine::fault). Steps appended directly
/// also propagate the error through [`Coroutine::exec`](crate::Coroutine::exec),
/// while bodies compiled by the control-flow builders swallow it after
/// recording (iteration simply ends early).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoroError {
    /// A directly appended step failed while the engine was driving it.
    #[error("step {pc} of {coroutine} failed: {message}")]
    StepFault {
        coroutine: String,
        pc: usize,
        message: String,
    },

    /// A loop or branch body failed; the coroutine was stopped in place.
    #[error("body fault in {coroutine}: {message}")]
    BodyFault { coroutine: String, message: String },

    /// Failure raised by caller code inside a step or body closure.
    #[error("{0}")]
    Message(String),
}

impl CoroError {
    /// Create an error from caller code inside a step or body.
    pub fn message(message: impl Into<String>) -> Self {
        CoroError::Message(message.into())
    }
}
