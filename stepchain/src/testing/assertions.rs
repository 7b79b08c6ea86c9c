//! Assertions for pipeline errors.

use crate::errors::PipelineError;

/// Asserts that the pipeline stopped on a cancelled token.
pub fn assert_cancelled(error: &PipelineError) {
    assert!(
        error.is_cancelled(),
        "Expected cancellation error, got: {error}"
    );
}

/// Asserts that the pipeline stopped on a domain error from `step`.
pub fn assert_step_failed(error: &PipelineError, step: &str) {
    assert!(
        matches!(error, PipelineError::Step { .. }),
        "Expected step error, got: {error}"
    );
    assert_eq!(
        error.step(),
        Some(step),
        "Expected failure in '{}', got: {}",
        step,
        error
    );
}

/// Asserts that `step` failed on every one of `attempts` attempts.
pub fn assert_retries_exhausted(error: &PipelineError, step: &str, attempts: u32) {
    match error {
        PipelineError::RetriesExhausted {
            step: actual,
            attempts: actual_attempts,
            ..
        } => {
            assert_eq!(actual, step, "Expected exhaustion in '{step}', got '{actual}'");
            assert_eq!(
                *actual_attempts, attempts,
                "Expected {attempts} attempts, got {actual_attempts}"
            );
        }
        other => panic!("Expected retry exhaustion, got: {other}"),
    }
}

/// Asserts that `step` panicked with a message containing `fragment`.
pub fn assert_panicked(error: &PipelineError, step: &str, fragment: &str) {
    match error {
        PipelineError::Panicked {
            step: actual,
            message,
        } => {
            assert_eq!(actual, step, "Expected panic in '{step}', got '{actual}'");
            assert!(
                message.contains(fragment),
                "Expected panic message containing '{fragment}', got '{message}'"
            );
        }
        other => panic!("Expected contained panic, got: {other}"),
    }
}

/// Asserts that `then` was given no step.
pub fn assert_nil_step(error: &PipelineError) {
    assert!(error.is_nil_step(), "Expected nil step error, got: {error}");
}

/// Asserts that `finally` was given no step.
pub fn assert_nil_final_step(error: &PipelineError) {
    assert!(
        error.is_nil_final_step(),
        "Expected nil final step error, got: {error}"
    );
}
