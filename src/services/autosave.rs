//! Debounced scheduling of remote saves.

use std::{
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::{task::JoinHandle, time::sleep};
use tracing::debug;

/// Restartable quiet-period timer.
///
/// Every [`arm`](AutosaveTimer::arm) cancels the previously pending request
/// and starts a fresh quiet period, so only the latest request ever runs. A
/// save that already started is detached from the timer and runs to
/// completion.
pub struct AutosaveTimer {
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveTimer {
    /// Timer waiting `debounce` after the last arm before running the save.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: Mutex::new(None),
        }
    }

    /// Quiet period of the timer.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Schedule `save` after the quiet period, replacing any pending request.
    pub fn arm<F>(&self, save: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            sleep(debounce).await;
            tokio::spawn(save);
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
            debug!("autosave re-armed");
        }
    }

    /// Drop the pending request, if any.
    pub fn cancel(&self) {
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.abort();
            debug!("autosave cancelled");
        }
    }

    /// Whether a request is still waiting for its quiet period to end.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for AutosaveTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_restarts_the_quiet_period() {
        let timer = AutosaveTimer::new(Duration::from_secs(4));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            timer.arm(counting(&runs));
            sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_pending_save() {
        let timer = AutosaveTimer::new(Duration::from_secs(4));
        let runs = Arc::new(AtomicUsize::new(0));

        timer.arm(counting(&runs));
        timer.cancel();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
