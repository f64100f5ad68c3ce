//! Cancellation context for long-running reconciliation work
//!
//! Every retry loop takes a Context so the caller can abort it, either
//! explicitly or by attaching a deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;

/// Context carries the cancellation signal and optional deadline of one
/// reconciliation invocation. Cheap to clone; clones share the signal.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    done: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                done: done_rx,
                done_tx,
            }),
        }
    }

    /// Derive a child context that is cancelled when the timeout elapses or
    /// when this context is cancelled, whichever happens first.
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut deadline = Instant::now() + timeout;
        if let Some(parent_deadline) = self.inner.deadline {
            deadline = deadline.min(parent_deadline);
        }

        let (done_tx, done_rx) = watch::channel(self.is_cancelled());

        let signal = done_tx.clone();
        let parent = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep_until(deadline.into()) => {}
                _ = parent.cancelled() => {}
                _ = signal.closed() => return,
            }
            let _ = signal.send(true);
        });

        Self {
            inner: Arc::new(ContextInner {
                deadline: Some(deadline),
                done: done_rx,
                done_tx,
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.inner.done.borrow() {
            return true;
        }
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Resolves once work done on behalf of this context should stop
    pub async fn cancelled(&self) {
        let mut done = self.inner.done.clone();
        // The sender lives as long as `self`, so this only returns once the flag flips
        let _ = done.wait_for(|cancelled| *cancelled).await;
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
