//! # Stepchain
//!
//! Sequential step pipelines over an untyped argument bundle.
//!
//! A pipeline threads an [`Args`] bundle through an ordered list of steps and
//! ends with a typed final step. Execution provides:
//!
//! - **Short-circuiting**: the first failure stops the pipeline and is returned
//! - **Cancellation checks**: the token is checked before every step
//! - **Panic containment**: a panicking step becomes an error, never a crash
//! - **Retry with backoff**: exponential delays with random jitter
//!
//! ## Quick Start
//!
//! ```rust
//! use stepchain::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let double: Step = Step::from_fn(|_ctx, args| Ok(args![args.get::<i64>(0)? * 2]));
//! let describe: FinalStep<String> =
//!     Step::from_fn(|_ctx, args| Ok(format!("got {}", args.get::<i64>(0)?)));
//!
//! let policy = RetryPolicy::new().with_max_attempts(2);
//! let result = process_with_retry(
//!     CancellationToken::shared(),
//!     vec![double],
//!     describe,
//!     &policy,
//!     args![21],
//! )
//! .await;
//!
//! assert_eq!(result.unwrap(), "got 42");
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod pipeline;
pub mod testing;

pub use crate::cancellation::CancellationToken;
pub use crate::core::{Args, Value};
pub use crate::errors::{PipelineError, Sentinel, StepError};
pub use crate::pipeline::{
    process, process_with_retry, Chain, FinalStep, RetryPolicy, Step, StepContext,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::args;
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{Args, Value};
    pub use crate::errors::{PipelineError, Sentinel, StepError};
    pub use crate::pipeline::{
        process, process_with_retry, Chain, FinalStep, RetryPolicy, Step, StepContext,
        StepFuture,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[tokio::test]
    async fn test_prelude_runs_a_pipeline() {
        let result = process(
            CancellationToken::shared(),
            Vec::<Step>::new(),
            Step::from_fn(|_ctx, args: Args| args.get::<String>(0)),
            args!["hello"],
        )
        .await;

        assert_eq!(result.unwrap(), "hello");
    }
}
