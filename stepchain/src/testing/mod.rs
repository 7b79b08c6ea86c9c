//! Testing utilities for stepchain pipelines.
//!
//! This module provides:
//! - Mock steps that count calls, fail, flake, panic or sleep
//! - Assertions for pipeline errors
//! - A tracing subscriber for test output

mod assertions;
mod mocks;

pub use assertions::{
    assert_cancelled, assert_nil_final_step, assert_nil_step, assert_panicked,
    assert_retries_exhausted, assert_step_failed,
};
pub use mocks::{
    counting_step, failing_step, flaky_step, panicking_step, sentinel_step, slow_step,
    CallCounter,
};

/// Installs a `tracing` subscriber that writes to the test harness output.
///
/// Honours `RUST_LOG`; defaults to `stepchain=debug`. Safe to call from
/// every test, only the first call installs.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stepchain=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
