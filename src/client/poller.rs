use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::QueueSyncClient;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to the background refresh task.
///
/// `stop()` cancels the task and waits for it to wind down; dropping the
/// handle without stopping still aborts it.
pub struct SyncPoller {
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl SyncPoller {
    /// Intervals shorter than a millisecond (including zero) are raised to one.
    pub(super) fn spawn(client: Arc<QueueSyncClient>, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        tracing::debug!("Starting queue refresh every {:?}", interval);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                client.synchronize().await;
            }
        });
        Self {
            handle: Some(handle),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the refresh task. No refresh starts after this returns.
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
            tracing::debug!("Queue refresh stopped");
        }
    }
}

impl Drop for SyncPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client_with, FakeBackend};
    use std::sync::atomic::Ordering;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_refresh_is_immediate() {
        let backend = Arc::new(FakeBackend::new());
        let client = client_with(&backend);

        let poller = client.start_polling(Duration::from_secs(5));
        settle().await;

        assert!(poller.is_running());
        assert_eq!(poller.interval(), Duration::from_secs(5));
        assert_eq!(backend.view_calls.load(Ordering::SeqCst), 1);
        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_on_interval() {
        let backend = Arc::new(FakeBackend::new());
        let client = client_with(&backend);

        let poller = client.start_polling(Duration::from_secs(5));
        settle().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(backend.view_calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(backend.view_calls.load(Ordering::SeqCst), 3);

        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let backend = Arc::new(FakeBackend::new());
        let client = client_with(&backend);

        let poller = client.start_polling(Duration::ZERO);
        settle().await;

        assert!(poller.is_running());
        assert_eq!(poller.interval(), MIN_INTERVAL);
        assert_eq!(backend.view_calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(MIN_INTERVAL).await;
        settle().await;
        assert!(backend.view_calls.load(Ordering::SeqCst) >= 2);
        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_refresh_after_stop() {
        let backend = Arc::new(FakeBackend::new());
        let client = client_with(&backend);

        let poller = client.start_polling(Duration::from_secs(5));
        settle().await;
        poller.stop().await;
        let calls = backend.view_calls.load(Ordering::SeqCst);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;

        assert_eq!(backend.view_calls.load(Ordering::SeqCst), calls);
        // Poller held the only other client reference
        assert_eq!(Arc::strong_count(&client), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_task() {
        let backend = Arc::new(FakeBackend::new());
        let client = client_with(&backend);

        let poller = client.start_polling(Duration::from_secs(5));
        settle().await;
        drop(poller);
        settle().await;

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;

        assert_eq!(backend.view_calls.load(Ordering::SeqCst), 1);
    }
}
