//! Step functions and the context they receive.

use crate::cancellation::CancellationToken;
use crate::core::Args;
use crate::errors::StepError;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Boxed future returned by a step invocation.
pub type StepFuture<O> = BoxFuture<'static, Result<O, StepError>>;

type StepFn<O> = Arc<dyn Fn(StepContext, Args) -> StepFuture<O> + Send + Sync>;

/// What a step sees about the run it belongs to.
#[derive(Debug, Clone)]
pub struct StepContext {
    token: Arc<CancellationToken>,
    label: String,
    attempt: u32,
}

impl StepContext {
    pub(crate) fn new(token: Arc<CancellationToken>, label: impl Into<String>, attempt: u32) -> Self {
        Self {
            token,
            label: label.into(),
            attempt,
        }
    }

    /// Returns the pipeline's cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns true if the pipeline has been cancelled.
    ///
    /// The executor only checks before a step starts; long-running steps
    /// should poll this themselves.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the label the step runs under.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the 0-indexed attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// A pipeline step producing `O`.
///
/// Intermediate steps produce the next [`Args`] bundle (the default `O`);
/// the final step produces the pipeline's typed result (see [`FinalStep`]).
/// Steps are cheap to clone and may be reused across pipelines.
pub struct Step<O = Args> {
    label: Option<String>,
    func: StepFn<O>,
}

/// The terminal step of a pipeline, producing its typed result.
pub type FinalStep<T> = Step<T>;

impl<O: Send + 'static> Step<O> {
    /// Creates a step from an async function.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(StepContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
    {
        Self {
            label: None,
            func: Arc::new(move |ctx: StepContext, args: Args| -> StepFuture<O> {
                Box::pin(func(ctx, args))
            }),
        }
    }

    /// Creates a labelled step from an async function.
    pub fn named<F, Fut>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(StepContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
    {
        Self::new(func).with_label(label)
    }

    /// Creates a step from a synchronous function.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(StepContext, Args) -> Result<O, StepError> + Send + Sync + 'static,
    {
        Self::new(move |ctx, args| futures::future::ready(func(ctx, args)))
    }

    /// Sets the label used in errors and logs.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl<O> Step<O> {
    /// Returns the explicit label, if one was set.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns the explicit label or `fallback`.
    pub(crate) fn label_or(&self, fallback: impl FnOnce() -> String) -> String {
        self.label.clone().unwrap_or_else(fallback)
    }

    /// Starts one invocation.
    pub(crate) fn call(&self, ctx: StepContext, args: Args) -> StepFuture<O> {
        (self.func)(ctx, args)
    }
}

impl<O> Clone for Step<O> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<O> fmt::Debug for Step<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    fn ctx() -> StepContext {
        StepContext::new(CancellationToken::shared(), "test", 0)
    }

    #[tokio::test]
    async fn test_async_step_invocation() {
        let step = Step::new(|_ctx, args: Args| async move { Ok(args.with("done")) });
        let out = step.call(ctx(), args![1]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.get::<String>(1).unwrap(), "done");
    }

    #[tokio::test]
    async fn test_sync_step_invocation() {
        let step: FinalStep<i64> = Step::from_fn(|_ctx, args| Ok(args.get::<i64>(0)? * 10));
        assert_eq!(step.call(ctx(), args![4]).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_step_sees_context() {
        let step: FinalStep<String> =
            Step::from_fn(|ctx, _args| Ok(format!("{}#{}", ctx.label(), ctx.attempt())));
        let out = step
            .call(StepContext::new(CancellationToken::shared(), "load", 2), args![])
            .await
            .unwrap();
        assert_eq!(out, "load#2");
    }

    #[test]
    fn test_labels() {
        let step: Step = Step::from_fn(|_ctx, args| Ok(args));
        assert_eq!(step.label(), None);
        assert_eq!(step.label_or(|| "step 1".to_string()), "step 1");

        let named: Step = Step::named("parse", |_ctx, args: Args| async move { Ok(args) });
        assert_eq!(named.label(), Some("parse"));
        assert_eq!(named.clone().label_or(|| "unused".to_string()), "parse");
    }

    #[test]
    fn test_context_reports_cancellation() {
        let ctx = StepContext::new(CancellationToken::cancelled("stop"), "x", 0);
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.token().reason().as_deref(), Some("stop"));
    }
}
