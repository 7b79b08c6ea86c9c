//! Cancellation token shared between a pipeline and its host.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A callback invoked once, with the reason, when a token is cancelled.
pub type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A token for cooperative cancellation of pipeline runs.
///
/// Cancellation is idempotent: only the first reason is kept and callbacks
/// run exactly once.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<CancelCallback>>,
}

impl CancellationToken {
    /// Creates a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new token ready to be shared with a pipeline.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Creates a shared token that is already cancelled.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Arc<Self> {
        let token = Self::shared();
        token.cancel(reason);
        token
    }

    /// Requests cancellation with a reason.
    ///
    /// Callbacks run on the calling thread. A panicking callback is logged
    /// and does not prevent the others from running.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut slot = self.reason.write();
            if slot.is_some() {
                return;
            }
            // the reason must be visible before the flag is
            *slot = Some(reason.clone());
            self.cancelled.store(true, Ordering::SeqCst);
        }

        let callbacks = std::mem::take(&mut *self.callbacks.write());
        for callback in &callbacks {
            run_callback(callback.as_ref(), &reason);
        }
    }

    /// Cancels the token after `delay` on the current tokio runtime.
    pub fn cancel_after(self: &Arc<Self>, delay: Duration, reason: impl Into<String>) {
        let token = Arc::clone(self);
        let reason = reason.into();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            token.cancel(reason);
        });
    }

    /// Registers a callback to run on cancellation.
    ///
    /// If the token is already cancelled, the callback runs immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        if let Some(reason) = self.reason() {
            run_callback(&callback, &reason);
            return;
        }

        let mut callbacks = self.callbacks.write();
        // cancel() may have won the race between the check above and the lock
        if self.is_cancelled() {
            drop(callbacks);
            run_callback(&callback, &self.reason().unwrap_or_default());
        } else {
            callbacks.push(Box::new(callback));
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}

fn run_callback(callback: &(dyn Fn(&str) + Send + Sync), reason: &str) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(reason))) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel() {
        let token = CancellationToken::new();
        token.cancel("User requested");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("User requested".to_string()));
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("First reason");
        token.cancel("Second reason");

        assert_eq!(token.reason(), Some("First reason".to_string()));
    }

    #[test]
    fn test_cancelled_constructor() {
        let token = CancellationToken::cancelled("shutdown");
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("shutdown"));
    }

    #[test]
    fn test_on_cancel_before_cancellation() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        token.on_cancel(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        token.cancel("test");
        token.cancel("again");

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_cancel_after_cancellation_receives_reason() {
        let token = CancellationToken::new();
        token.cancel("deadline");

        let seen = Arc::new(RwLock::new(String::new()));
        let seen_clone = seen.clone();
        token.on_cancel(move |reason| {
            *seen_clone.write() = reason.to_string();
        });

        assert_eq!(*seen.read(), "deadline");
    }

    #[test]
    fn test_callback_panic_suppressed() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        token.on_cancel(|_| panic!("Intentional panic"));
        token.on_cancel(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel("test");
        assert!(token.is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reason_visible_once_cancelled() {
        for _ in 0..200 {
            let token = CancellationToken::shared();
            let canceller = Arc::clone(&token);
            let handle = std::thread::spawn(move || canceller.cancel("racing"));

            loop {
                if token.is_cancelled() {
                    assert_eq!(token.reason().as_deref(), Some("racing"));
                    break;
                }
                std::hint::spin_loop();
            }
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_on_cancel_racing_cancel_gets_reason() {
        for _ in 0..200 {
            let token = CancellationToken::shared();
            let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
            let canceller = Arc::clone(&token);
            let handle = std::thread::spawn(move || canceller.cancel("racing"));

            let sink = Arc::clone(&seen);
            token.on_cancel(move |reason| sink.lock().push(reason.to_string()));
            handle.join().unwrap();

            assert_eq!(*seen.lock(), vec!["racing".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_cancel_after_delay() {
        let token = CancellationToken::shared();
        token.cancel_after(Duration::from_millis(5), "timer");
        assert!(!token.is_cancelled());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("timer"));
    }
}
