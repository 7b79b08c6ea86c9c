//! One-call helpers that build a chain, run every step and finish it.

use super::chain::Chain;
use super::retry::RetryPolicy;
use super::step::{FinalStep, Step};
use crate::cancellation::CancellationToken;
use crate::core::Args;
use crate::errors::PipelineError;
use std::sync::Arc;

/// Runs `steps` in order, then `final_step`, without retries.
///
/// Equivalent to folding [`Chain::then`] over `steps` and calling
/// [`Chain::finally`]. An empty `steps` goes straight to the final step.
pub async fn process<T, I>(
    token: Arc<CancellationToken>,
    steps: I,
    final_step: impl Into<Option<FinalStep<T>>>,
    args: Args,
) -> Result<T, PipelineError>
where
    I: IntoIterator,
    I::Item: Into<Option<Step>>,
{
    process_with_retry(token, steps, final_step, &RetryPolicy::default(), args).await
}

/// Runs `steps` in order, then `final_step`, retrying each according to
/// `retry`.
pub async fn process_with_retry<T, I>(
    token: Arc<CancellationToken>,
    steps: I,
    final_step: impl Into<Option<FinalStep<T>>>,
    retry: &RetryPolicy,
    args: Args,
) -> Result<T, PipelineError>
where
    I: IntoIterator,
    I::Item: Into<Option<Step>>,
{
    let mut chain = Chain::with_retry(token, retry, args);
    for step in steps {
        chain = chain.then(step).await;
    }
    chain.finally(final_step).await
}
