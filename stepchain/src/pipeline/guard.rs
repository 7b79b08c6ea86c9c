//! Guarded invocation of a single step.
//!
//! One `catch_unwind` boundary covers the whole retry sequence: a panic in
//! any attempt ends the invocation and is never retried. Only returned
//! errors go through the retry policy.

use super::retry::RetryPolicy;
use super::step::{Step, StepContext};
use crate::cancellation::CancellationToken;
use crate::core::Args;
use crate::errors::PipelineError;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Everything a guarded call needs besides the step itself.
pub(crate) struct Invocation<'a> {
    pub run_id: Uuid,
    pub label: &'a str,
    pub token: &'a Arc<CancellationToken>,
    pub args: &'a Args,
    pub policy: &'a RetryPolicy,
}

impl Invocation<'_> {
    /// Runs `step` under panic containment and the retry policy.
    pub(crate) async fn run<O>(&self, step: &Step<O>) -> Result<O, PipelineError> {
        let span = tracing::debug_span!(
            "pipeline_step",
            run_id = %self.run_id,
            step = self.label,
            max_attempts = self.policy.max_attempts + 1,
        );

        let attempts = AssertUnwindSafe(self.retry_loop(step)).catch_unwind();
        match attempts.instrument(span).await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    run_id = %self.run_id,
                    step = self.label,
                    panic = %message,
                    "Step panicked"
                );
                Err(PipelineError::Panicked {
                    step: self.label.to_string(),
                    message,
                })
            }
        }
    }

    async fn retry_loop<O>(&self, step: &Step<O>) -> Result<O, PipelineError> {
        let mut attempt: u32 = 0;

        loop {
            let ctx = StepContext::new(Arc::clone(self.token), self.label, attempt);
            let error = match step.call(ctx, self.args.clone()).await {
                Ok(output) => return Ok(output),
                Err(error) => error,
            };

            if !self.policy.retries_enabled() || !self.policy.is_retryable(&error) {
                return Err(PipelineError::Step {
                    step: self.label.to_string(),
                    source: error,
                });
            }

            if attempt >= self.policy.max_attempts {
                return Err(PipelineError::RetriesExhausted {
                    step: self.label.to_string(),
                    attempts: attempt + 1,
                    last: error,
                });
            }

            // not interrupted by cancellation; the token is checked again before the next step
            let delay = self.policy.backoff_delay(attempt);
            debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
