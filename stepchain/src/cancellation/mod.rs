//! Cooperative cancellation for pipeline runs.
//!
//! A pipeline checks its [`CancellationToken`] immediately before each step
//! is invoked. Steps that run for a long time are expected to check the token
//! themselves through their `StepContext`.

mod token;

pub use token::{CancelCallback, CancellationToken};
