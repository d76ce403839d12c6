//! ``src/tasks/completion.rs``
//! ============================================================================
//! # Completion Barrier: waiting for any number of concurrent scans
//!
//! A [`CompletionBarrier`] counts pending units of work. Each scan registers
//! one unit before its entry point returns and releases it when its task
//! ends, whichever way it ends. The caller owns the barrier, may share it
//! between any number of scans, and awaits [`CompletionBarrier::wait`] to
//! learn that all of them are done.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::sync::Notify;
use tracing::error;

#[derive(Debug, Default)]
struct BarrierInner {
    pending: AtomicUsize,
    notify: Notify,
}

/// Countdown of pending work shared between a caller and its scans.
///
/// Cloning is cheap and every clone observes the same count.
#[derive(Debug, Clone, Default)]
pub struct CompletionBarrier {
    inner: Arc<BarrierInner>,
}

impl CompletionBarrier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` pending units.
    pub fn add(&self, n: usize) {
        self.inner.pending.fetch_add(n, Ordering::AcqRel);
    }

    /// Releases one pending unit, waking waiters when the count reaches zero.
    ///
    /// Releasing more units than were added is a caller bug; the count stays
    /// at zero and the event is logged.
    pub fn done(&self) {
        let previous = self
            .inner
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => self.inner.notify.notify_waiters(),
            Ok(_) => {}
            Err(_) => error!(
                marker = "COMPLETION_BARRIER",
                operation_type = "barrier_underflow",
                "done() called on a barrier with no pending work"
            ),
        }
    }

    /// Registers one unit and returns a guard that releases it on drop.
    #[must_use = "dropping the token releases the pending unit immediately"]
    pub fn register(&self) -> CompletionToken {
        self.add(1);

        CompletionToken {
            barrier: self.clone(),
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Resolves once the pending count is zero.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);

            // Register interest before checking, so a release between the
            // check and the await is not lost.
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Like [`wait`](Self::wait) with a deadline. Returns `false` on timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

/// One registered unit of work. Dropping it calls [`CompletionBarrier::done`].
#[derive(Debug)]
pub struct CompletionToken {
    barrier: CompletionBarrier,
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        self.barrier.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_releases_on_drop() {
        let barrier = CompletionBarrier::new();

        let first = barrier.register();
        let second = barrier.register();
        assert_eq!(barrier.pending(), 2);

        drop(first);
        assert_eq!(barrier.pending(), 1);

        drop(second);
        assert_eq!(barrier.pending(), 0);
    }

    #[test]
    fn test_extra_done_does_not_underflow() {
        let barrier = CompletionBarrier::new();
        barrier.done();

        assert_eq!(barrier.pending(), 0);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_idle() {
        let barrier = CompletionBarrier::new();
        assert!(barrier.wait_timeout(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_all_released() {
        let barrier = CompletionBarrier::new();
        let tokens: Vec<CompletionToken> = (0..4).map(|_| barrier.register()).collect();

        assert!(!barrier.wait_timeout(Duration::from_millis(20)).await);

        let releaser = tokio::spawn(async move {
            for token in tokens {
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(token);
            }
        });

        assert!(barrier.wait_timeout(Duration::from_secs(5)).await);
        assert_eq!(barrier.pending(), 0);
        releaser.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_and_release() {
        let barrier = CompletionBarrier::new();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let token = barrier.register();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    drop(token);
                })
            })
            .collect();

        barrier.wait().await;
        assert_eq!(barrier.pending(), 0);

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
