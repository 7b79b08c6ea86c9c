//! Pipeline building and execution.
//!
//! This module provides:
//! - Step functions and their context
//! - The `Chain` state with `then` / `finally`
//! - Guarded invocation (panic containment + retry)
//! - Retry policy with exponential backoff and jitter
//! - One-call `process` helpers

mod chain;
mod guard;
mod process;
mod retry;
mod step;

pub use chain::{Chain, FINAL_STEP_LABEL};
pub use process::{process, process_with_retry};
pub use retry::{
    with_jitter, RetryPolicy, DEFAULT_BASE_DELAY, MAX_BASE_DELAY, MAX_RETRY_ATTEMPTS,
};
pub use step::{FinalStep, Step, StepContext, StepFuture};
