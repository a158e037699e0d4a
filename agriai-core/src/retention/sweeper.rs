//! Background expiry of retained entries
//!
//! The [`Sweeper`] owns one tokio task that prunes every registered feed
//! once at start and then on a fixed interval. It stops when
//! [`Sweeper::shutdown`] is called or the handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Sweep;

/// Handle to the running sweep task
pub struct Sweeper {
    handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl Sweeper {
    /// Spawn the sweep task on the current tokio runtime
    pub fn start(targets: Vec<Arc<dyn Sweep>>, interval: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sweep_loop(targets, interval, cancel_token.clone()));

        tracing::info!(interval_secs = interval.as_secs_f64(), "Sweeper started");

        Self {
            handle: Some(handle),
            cancel_token,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop sweeping and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Sweep task failed to join");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn sweep_loop(
    targets: Vec<Arc<dyn Sweep>>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    // The first tick completes immediately, which gives the startup sweep
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for target in &targets {
                    let removed = target.sweep();
                    tracing::debug!(key = target.key(), removed, "Sweep pass");
                }
            }
            _ = cancel_token.cancelled() => {
                tracing::info!("Sweeper shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts sweeps
    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Sweep for Counter {
        fn key(&self) -> &str {
            "counter"
        }

        fn sweep(&self) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    async fn wait_for(counter: &Counter, at_least: usize) {
        for _ in 0..200 {
            if counter.0.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sweep count never reached {}", at_least);
    }

    #[tokio::test]
    async fn test_sweeps_once_at_start() {
        let counter = Arc::new(Counter::default());
        let sweeper = Sweeper::start(
            vec![counter.clone() as Arc<dyn Sweep>],
            Duration::from_secs(3600),
        );

        wait_for(&counter, 1).await;
        assert!(sweeper.is_running());

        sweeper.shutdown().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweeps_on_interval_until_shutdown() {
        let counter = Arc::new(Counter::default());
        let sweeper = Sweeper::start(
            vec![counter.clone() as Arc<dyn Sweep>],
            Duration::from_millis(20),
        );

        wait_for(&counter, 3).await;
        sweeper.shutdown().await;

        let after_shutdown = counter.0.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), after_shutdown);
    }

    #[tokio::test]
    async fn test_drop_cancels_task() {
        let counter = Arc::new(Counter::default());
        {
            let _sweeper = Sweeper::start(
                vec![counter.clone() as Arc<dyn Sweep>],
                Duration::from_millis(20),
            );
            wait_for(&counter, 1).await;
        }

        // Let the cancelled task observe the token
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_drop = counter.0.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), after_drop);
    }
}
