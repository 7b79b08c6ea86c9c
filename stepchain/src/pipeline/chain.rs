//! The chain: immutable pipeline state threaded through each step.

use super::guard::Invocation;
use super::retry::RetryPolicy;
use super::step::{FinalStep, Step};
use crate::cancellation::CancellationToken;
use crate::core::Args;
use crate::errors::PipelineError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Label used for a final step that has none of its own.
pub const FINAL_STEP_LABEL: &str = "final step";

/// Pipeline state between two steps.
///
/// Every transition consumes the chain and returns a new one, so a chain
/// that has failed stays failed: later [`then`](Self::then) calls are no-ops
/// and [`finally`](Self::finally) returns the recorded error.
///
/// ```rust
/// use stepchain::{args, CancellationToken, Chain, FinalStep, Step};
///
/// # tokio_test::block_on(async {
/// let add_one: Step = Step::from_fn(|_ctx, args| Ok(args![args.get::<i64>(0)? + 1]));
/// let square: FinalStep<i64> = Step::from_fn(|_ctx, args| Ok(args.get::<i64>(0)?.pow(2)));
///
/// let result = Chain::new(CancellationToken::shared(), args![4])
///     .then(add_one)
///     .await
///     .finally(square)
///     .await;
///
/// assert_eq!(result.unwrap(), 25);
/// # });
/// ```
pub struct Chain<T> {
    token: Arc<CancellationToken>,
    args: Args,
    error: Option<PipelineError>,
    retry: RetryPolicy,
    position: usize,
    run_id: Uuid,
    _output: PhantomData<fn() -> T>,
}

impl<T> Chain<T> {
    /// Starts a pipeline without retries.
    #[must_use]
    pub fn new(token: Arc<CancellationToken>, args: Args) -> Self {
        Self::with_retry(token, &RetryPolicy::default(), args)
    }

    /// Starts a pipeline whose steps are retried according to `retry`.
    ///
    /// The policy is normalized first; out-of-range values are clamped.
    #[must_use]
    pub fn with_retry(token: Arc<CancellationToken>, retry: &RetryPolicy, args: Args) -> Self {
        let run_id = Uuid::new_v4();
        let retry = retry.normalized();
        debug!(
            run_id = %run_id,
            args = args.len(),
            max_attempts = retry.max_attempts,
            "Pipeline created"
        );

        Self {
            token,
            args,
            error: None,
            retry,
            position: 0,
            run_id,
            _output: PhantomData,
        }
    }

    /// Runs `step` on the current args and returns the next state.
    ///
    /// Does nothing if the chain has already failed. A `None` step fails the
    /// chain with [`PipelineError::NilStep`]; a cancelled token fails it with
    /// [`PipelineError::Cancelled`] before the step is called.
    pub async fn then(self, step: impl Into<Option<Step>>) -> Self {
        if let Some(error) = &self.error {
            debug!(run_id = %self.run_id, error = %error, "Skipping step after earlier failure");
            return self;
        }

        let position = self.position + 1;
        let Some(step) = step.into() else {
            return self.fail(position, PipelineError::NilStep);
        };

        let label = step.label_or(|| format!("step {position}"));
        if let Err(error) = self.check_cancelled(&label) {
            return self.fail(position, error);
        }

        debug!(run_id = %self.run_id, step = %label, "Running step");
        let outcome = self.invocation(&label).run(&step).await;
        match outcome {
            Ok(args) => {
                debug!(run_id = %self.run_id, step = %label, args = args.len(), "Step completed");
                Self {
                    args,
                    position,
                    ..self
                }
            }
            Err(error) => self.fail(position, error),
        }
    }

    /// Runs `final_step` and ends the pipeline.
    ///
    /// Returns the chain's recorded error without calling anything if an
    /// earlier step failed.
    pub async fn finally(
        self,
        final_step: impl Into<Option<FinalStep<T>>>,
    ) -> Result<T, PipelineError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let Some(step) = final_step.into() else {
            return Err(PipelineError::NilFinalStep);
        };

        let label = step.label_or(|| FINAL_STEP_LABEL.to_string());
        self.check_cancelled(&label)?;

        debug!(run_id = %self.run_id, step = %label, "Running final step");
        let result = self.invocation(&label).run(&step).await;
        if result.is_ok() {
            debug!(run_id = %self.run_id, step = %label, "Pipeline completed");
        }
        result
    }

    /// Returns the current args bundle.
    #[must_use]
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Returns the recorded terminal error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    /// Returns true if the chain has failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the normalized retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns the identifier used in this run's log fields.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the number of steps passed to `then` so far.
    #[must_use]
    pub fn steps_seen(&self) -> usize {
        self.position
    }

    /// Ends the chain without a final step, yielding the current args.
    pub fn into_args(self) -> Result<Args, PipelineError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.args),
        }
    }

    fn check_cancelled(&self, label: &str) -> Result<(), PipelineError> {
        if !self.token.is_cancelled() {
            return Ok(());
        }

        let reason = self.token.reason();
        debug!(run_id = %self.run_id, step = %label, reason = ?reason, "Cancelled before step");
        Err(PipelineError::Cancelled {
            step: label.to_string(),
            reason,
        })
    }

    fn invocation<'a>(&'a self, label: &'a str) -> Invocation<'a> {
        Invocation {
            run_id: self.run_id,
            label,
            token: &self.token,
            args: &self.args,
            policy: &self.retry,
        }
    }

    fn fail(self, position: usize, error: PipelineError) -> Self {
        Self {
            args: Args::new(),
            error: Some(error),
            position,
            ..self
        }
    }
}

impl<T> fmt::Debug for Chain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("run_id", &self.run_id)
            .field("position", &self.position)
            .field("args", &self.args)
            .field("error", &self.error)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::errors::StepError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn add(n: i64) -> Step {
        Step::from_fn(move |_ctx, args| Ok(args![args.get::<i64>(0)? + n]))
    }

    fn identity() -> FinalStep<i64> {
        Step::from_fn(|_ctx, args| args.get::<i64>(0))
    }

    #[tokio::test]
    async fn test_then_threads_args() {
        let chain = Chain::<i64>::new(CancellationToken::shared(), args![1])
            .then(add(2))
            .await
            .then(add(3))
            .await;

        assert!(!chain.is_failed());
        assert_eq!(chain.steps_seen(), 2);
        assert_eq!(chain.args().get::<i64>(0).unwrap(), 6);
        assert_eq!(chain.finally(identity()).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_default_labels_follow_position() {
        let fail: Step = Step::from_fn(|_ctx, _args| Err(StepError::msg("nope")));
        let chain = Chain::<i64>::new(CancellationToken::shared(), args![0])
            .then(add(1))
            .await
            .then(fail)
            .await;

        let err = chain.error().unwrap();
        assert_eq!(err.step(), Some("step 2"));
        assert_eq!(err.to_string(), "error in step 2: nope");
    }

    #[tokio::test]
    async fn test_explicit_label_wins() {
        let fail: Step = Step::from_fn(|_ctx, _args| Err(StepError::msg("bad input")))
            .with_label("validate");
        let err = Chain::<i64>::new(CancellationToken::shared(), args![0])
            .then(fail)
            .await
            .finally(identity())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "error in validate: bad input");
    }

    #[tokio::test]
    async fn test_failed_chain_is_sticky() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let counting: Step = Step::from_fn(move |_ctx, args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(args)
        });

        let chain = Chain::<i64>::new(CancellationToken::shared(), args![0])
            .then(None::<Step>)
            .await
            .then(counting.clone())
            .await
            .then(counting)
            .await;

        assert!(chain.error().unwrap().is_nil_step());
        assert!(chain.args().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(chain.into_args().unwrap_err().is_nil_step());
    }

    #[tokio::test]
    async fn test_prior_error_wins_over_nil_final_step() {
        let err = Chain::<i64>::new(CancellationToken::shared(), args![0])
            .then(None::<Step>)
            .await
            .finally(None::<FinalStep<i64>>)
            .await
            .unwrap_err();

        assert!(err.is_nil_step());
    }

    #[tokio::test]
    async fn test_nil_final_step_on_healthy_chain() {
        let err = Chain::<i64>::new(CancellationToken::shared(), args![0])
            .then(add(1))
            .await
            .finally(None::<FinalStep<i64>>)
            .await
            .unwrap_err();

        assert!(err.is_nil_final_step());
    }

    #[tokio::test]
    async fn test_cancelled_before_final_step() {
        let token = CancellationToken::cancelled("shutdown");
        let err = Chain::<i64>::new(token, args![3])
            .finally(identity())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.step(), Some(FINAL_STEP_LABEL));
        assert_eq!(
            err.to_string(),
            "prior to call to final step, context is cancelled"
        );
        match err {
            PipelineError::Cancelled { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("shutdown"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_with_retry_normalizes_policy() {
        let policy = RetryPolicy::new()
            .with_max_attempts(50)
            .with_base_delay(Duration::from_secs(10));
        let chain = Chain::<i64>::with_retry(CancellationToken::shared(), &policy, args![]);

        assert_eq!(chain.retry_policy().max_attempts, 8);
        assert_eq!(chain.retry_policy().base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 50);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_created_event_logs_normalized_attempts() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let policy = RetryPolicy::new().with_max_attempts(50);
        tracing::subscriber::with_default(subscriber, || {
            let _chain = Chain::<i64>::with_retry(CancellationToken::shared(), &policy, args![]);
        });

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("Pipeline created"), "{output}");
        assert!(output.contains("max_attempts=8"), "{output}");
        assert!(!output.contains("max_attempts=50"), "{output}");
    }

    #[test]
    fn test_new_chain_state() {
        let token = CancellationToken::shared();
        let chain = Chain::<String>::new(Arc::clone(&token), args!["a", "b"]);

        assert!(!chain.is_failed());
        assert_eq!(chain.steps_seen(), 0);
        assert_eq!(chain.args().len(), 2);
        assert!(Arc::ptr_eq(chain.token(), &token));
        assert_eq!(chain.retry_policy(), &RetryPolicy::default());
        assert!(format!("{chain:?}").contains("Chain"));
    }
}
