//! Error types for stepchain pipelines.
//!
//! Two layers:
//! - [`StepError`] is what a step returns: an argument-shape problem or an
//!   arbitrary domain failure carried as an [`anyhow::Error`].
//! - [`PipelineError`] is the terminal error of a pipeline run. It names the
//!   offending step and never escapes as a panic.
//!
//! [`Sentinel`] values give domain errors a comparable identity so callers
//! and retry policies can recognise them anywhere in a `source()` chain.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// A well-known, comparable error value.
///
/// Sentinels are usually declared as statics and returned (possibly wrapped
/// in context) by step functions:
///
/// ```rust
/// use stepchain::{Sentinel, StepError};
///
/// static NOT_FOUND: Sentinel = Sentinel::new("record not found");
///
/// let err = StepError::sentinel(&NOT_FOUND).context("loading user 42");
/// assert!(err.is(&NOT_FOUND));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[error("{name}")]
#[serde(transparent)]
pub struct Sentinel {
    name: Cow<'static, str>,
}

impl Sentinel {
    /// Creates a sentinel with a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
        }
    }

    /// Creates a sentinel from a runtime string, e.g. one read from config.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
        }
    }

    /// Returns the sentinel's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The error a step returns.
#[derive(Debug, Error)]
pub enum StepError {
    /// The args bundle is shorter than the step expected.
    #[error("missing argument {index} (bundle holds {len} values)")]
    MissingArgument {
        /// The requested position.
        index: usize,
        /// The bundle length.
        len: usize,
    },

    /// The value at a position could not be read as the requested type.
    #[error("argument {index} is not a {expected}: {reason}")]
    ArgumentMismatch {
        /// The requested position.
        index: usize,
        /// The requested type name.
        expected: &'static str,
        /// The conversion failure.
        reason: String,
    },

    /// A domain failure raised by the step itself.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl StepError {
    /// Creates a domain failure from a message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::msg(message))
    }

    /// Creates a domain failure from any error value.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::new(error))
    }

    /// Creates a domain failure carrying a sentinel.
    #[must_use]
    pub fn sentinel(sentinel: &Sentinel) -> Self {
        Self::new(sentinel.clone())
    }

    /// Wraps the error with additional context, keeping the original in the
    /// source chain.
    #[must_use]
    pub fn context<C>(self, context: C) -> Self
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        match self {
            Self::Failed(err) => Self::Failed(err.context(context)),
            other => Self::Failed(anyhow::Error::new(other).context(context)),
        }
    }

    /// Returns true if `sentinel` appears anywhere in this error's chain.
    #[must_use]
    pub fn is(&self, sentinel: &Sentinel) -> bool {
        match self {
            Self::Failed(err) => err
                .chain()
                .any(|cause| {
                    cause.downcast_ref::<Sentinel>() == Some(sentinel)
                        || cause
                            .downcast_ref::<StepError>()
                            .is_some_and(|nested| nested.is(sentinel))
                }),
            Self::MissingArgument { .. } | Self::ArgumentMismatch { .. } => false,
        }
    }

    /// Returns true for argument-shape errors, which no retry can fix.
    #[must_use]
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::MissingArgument { .. } | Self::ArgumentMismatch { .. }
        )
    }
}

/// The terminal error of a pipeline run.
///
/// Once a chain carries one of these, every later step is skipped and the
/// same error is returned from `finally`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `then` was given no step.
    #[error("step provided to then cannot be absent")]
    NilStep,

    /// `finally` was given no step.
    #[error("step provided to finally cannot be absent")]
    NilFinalStep,

    /// The cancellation token was already cancelled before the step ran.
    #[error("prior to call to {step}, context is cancelled")]
    Cancelled {
        /// Label of the step that was not run.
        step: String,
        /// The token's cancellation reason, if any.
        reason: Option<String>,
    },

    /// The step panicked. Panics are never retried.
    #[error("error in {step}: {message}: unhandled panic")]
    Panicked {
        /// Label of the step that panicked.
        step: String,
        /// The panic payload, rendered as text.
        message: String,
    },

    /// Every attempt allowed by the retry policy failed.
    #[error("error in {step}: exceeded retry count after {attempts} attempts")]
    RetriesExhausted {
        /// Label of the failing step.
        step: String,
        /// Total number of attempts made.
        attempts: u32,
        /// The error returned by the last attempt.
        #[source]
        last: StepError,
    },

    /// The step returned an error that was not retried.
    #[error("error in {step}: {source}")]
    Step {
        /// Label of the failing step.
        step: String,
        /// The step's own error.
        source: StepError,
    },
}

impl PipelineError {
    /// Returns true if the pipeline stopped because its token was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if a step panicked.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Returns true if a step failed on every allowed attempt.
    #[must_use]
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Returns true if `then` was given no step.
    #[must_use]
    pub fn is_nil_step(&self) -> bool {
        matches!(self, Self::NilStep)
    }

    /// Returns true if `finally` was given no step.
    #[must_use]
    pub fn is_nil_final_step(&self) -> bool {
        matches!(self, Self::NilFinalStep)
    }

    /// Returns the label of the step the pipeline stopped at, if any.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::NilStep | Self::NilFinalStep => None,
            Self::Cancelled { step, .. }
            | Self::Panicked { step, .. }
            | Self::RetriesExhausted { step, .. }
            | Self::Step { step, .. } => Some(step),
        }
    }

    /// Returns the step's own error, if the pipeline stopped on one.
    #[must_use]
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            Self::Step { source, .. } => Some(source),
            Self::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// Returns true if `sentinel` appears in the step error's chain.
    #[must_use]
    pub fn is(&self, sentinel: &Sentinel) -> bool {
        self.step_error().is_some_and(|err| err.is(sentinel))
    }
}
