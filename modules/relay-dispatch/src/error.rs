//! Typed errors for dispatch and publish.

use std::fmt;

use thiserror::Error;

/// Which interceptor chain failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pre,
    Post,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pre => f.write_str("pre"),
            Stage::Post => f.write_str("post"),
        }
    }
}

/// Why a dispatch or publish call stopped.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The resolver could not produce a key. Nothing ran.
    #[error("cannot resolve a type key for {type_name}")]
    UnresolvedType { type_name: String },

    /// No command handler for the key. Events never raise this.
    #[error("no handler registered for type key {type_key:?}")]
    NoHandlerRegistered { type_key: String },

    /// A pre or post interceptor returned an error.
    #[error("{stage} interceptor failed for {type_key:?}")]
    InterceptorFailure {
        type_key: String,
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// The routed handler (or one of the subscribers) returned an error.
    #[error("handler failed for {type_key:?}")]
    HandlerFailure {
        type_key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// True when nothing was registered to handle the message.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, DispatchError::NoHandlerRegistered { .. })
    }

    /// The routing key, if resolution got that far.
    pub fn type_key(&self) -> Option<&str> {
        match self {
            DispatchError::UnresolvedType { .. } => None,
            DispatchError::NoHandlerRegistered { type_key }
            | DispatchError::InterceptorFailure { type_key, .. }
            | DispatchError::HandlerFailure { type_key, .. } => Some(type_key),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            DispatchError::InterceptorFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// A failed command dispatch.
///
/// `result` holds whatever the handler produced before things went wrong:
/// its partial result on `HandlerFailure`, its full result on a post
/// interceptor failure, and `None` when the handler never ran.
pub struct CommandFailure<R> {
    pub error: DispatchError,
    pub result: Option<R>,
}

impl<R> CommandFailure<R> {
    pub(crate) fn new(error: DispatchError) -> Self {
        Self {
            error,
            result: None,
        }
    }

    pub(crate) fn with_result(error: DispatchError, result: Option<R>) -> Self {
        Self { error, result }
    }

    /// Drop the partial result and keep the error.
    pub fn into_error(self) -> DispatchError {
        self.error
    }
}

impl<R> From<CommandFailure<R>> for DispatchError {
    fn from(failure: CommandFailure<R>) -> Self {
        failure.error
    }
}

impl<R> fmt::Debug for CommandFailure<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFailure")
            .field("error", &self.error)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}

impl<R> fmt::Display for CommandFailure<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<R> std::error::Error for CommandFailure<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
