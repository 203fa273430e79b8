use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Session-scoped cancellable debouncer.
///
/// Rapid user input (address keystrokes, method toggles) coalesces into the
/// last-settled state before any network call fires: each `call` cancels the
/// previously scheduled one, so only the final edit in a burst runs.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    scheduled: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            scheduled: Mutex::new(None),
        }
    }

    /// Schedules `task` to run after the debounce delay, cancelling any
    /// previously scheduled task.
    pub fn call<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task().await;
        });

        // A poisoned lock only means a scheduling task panicked; the stored
        // handle is still sound to replace.
        let mut scheduled = self.scheduled.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = scheduled.replace(handle) {
            previous.abort();
        }
    }

    /// Cancels any pending scheduled task.
    pub fn cancel(&self) {
        let mut scheduled = self.scheduled.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = scheduled.take() {
            previous.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Monotonic issuance counter for superseding in-flight validations.
///
/// Every edit begins a new generation; a validation result is applied only if
/// its token is still current when it lands. Last write wins by issuance
/// order, and stale responses are ignored rather than raced.
#[derive(Debug, Default)]
pub struct RequestSequence {
    counter: AtomicU64,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, invalidating all earlier tokens.
    pub fn begin(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.counter.load(Ordering::SeqCst) == token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn only_the_last_burst_call_runs() {
        let ran = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(Duration::from_millis(200));

        for _ in 0..3 {
            let ran = ran.clone();
            debouncer.call(move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_the_pending_task() {
        let ran = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(Duration::from_millis(100));
        {
            let ran = ran.clone();
            debouncer.call(move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn newer_generations_supersede_older_tokens() {
        let seq = RequestSequence::new();
        let first = seq.begin();
        assert!(seq.is_current(first));
        let second = seq.begin();
        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
    }
}
