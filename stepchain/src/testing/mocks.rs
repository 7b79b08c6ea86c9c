//! Mock steps for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::Args;
use crate::errors::{Sentinel, StepError};
use crate::pipeline::Step;

/// A shared call counter handed to mock steps.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one call.
    pub fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resets the count to zero.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

/// A step that counts its calls and passes args through unchanged.
#[must_use]
pub fn counting_step(counter: &CallCounter) -> Step {
    let counter = counter.clone();
    Step::from_fn(move |_ctx, args| {
        counter.record();
        Ok(args)
    })
}

/// A step that counts its calls and always fails with `message`.
#[must_use]
pub fn failing_step(counter: &CallCounter, message: impl Into<String>) -> Step {
    let counter = counter.clone();
    let message = message.into();
    Step::from_fn(move |_ctx, _args| {
        counter.record();
        Err(StepError::msg(message.clone()))
    })
}

/// A step that counts its calls and always fails with `sentinel`.
#[must_use]
pub fn sentinel_step(counter: &CallCounter, sentinel: &Sentinel) -> Step {
    let counter = counter.clone();
    let sentinel = sentinel.clone();
    Step::from_fn(move |ctx, _args| {
        counter.record();
        Err(StepError::sentinel(&sentinel).context(format!("attempt {}", ctx.attempt())))
    })
}

/// A step that fails its first `failures` attempts, then passes args through.
#[must_use]
pub fn flaky_step(counter: &CallCounter, failures: u32) -> Step {
    let counter = counter.clone();
    Step::from_fn(move |ctx, args| {
        counter.record();
        if ctx.attempt() < failures {
            Err(StepError::msg(format!("transient failure on attempt {}", ctx.attempt())))
        } else {
            Ok(args)
        }
    })
}

/// A step that panics with `message`.
#[must_use]
pub fn panicking_step(counter: &CallCounter, message: &'static str) -> Step {
    let counter = counter.clone();
    Step::from_fn(move |_ctx, _args| {
        counter.record();
        panic!("{}", message);
    })
}

/// A step that sleeps for `delay`, then passes args through.
#[must_use]
pub fn slow_step(counter: &CallCounter, delay: Duration) -> Step {
    let counter = counter.clone();
    Step::new(move |_ctx, args: Args| {
        let counter = counter.clone();
        async move {
            tokio::time::sleep(delay).await;
            counter.record();
            Ok(args)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_counter() {
        let counter = CallCounter::new();
        let shared = counter.clone();
        shared.record();
        shared.record();
        assert_eq!(counter.count(), 2);

        counter.reset();
        assert_eq!(shared.count(), 0);
    }

    #[test]
    fn test_mock_steps_are_unlabelled() {
        let counter = CallCounter::new();
        assert_eq!(counting_step(&counter).label(), None);
        assert_eq!(flaky_step(&counter, 1).label(), None);
    }
}
