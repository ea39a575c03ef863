//! Periodic background tasks with a shared shutdown signal.
//!
//! Each task runs on its own tokio task with its own timer, so a slow store
//! call in one cycle never delays another cycle or any request. Dropping the
//! [`Maintenance`] handle (or calling [`Maintenance::shutdown`]) stops them.

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct Maintenance {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for Maintenance {
    fn default() -> Self {
        Self::new()
    }
}

impl Maintenance {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Run `task` every `period`, first run one period from now.
    ///
    /// An in-flight run is abandoned when shutdown is signalled.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = async {
                        ticker.tick().await;
                        task().await;
                    } => {}
                }
            }

            debug!(task = name, "Maintenance task stopped");
        });

        info!(task = name, period_secs = period.as_secs(), "Maintenance task started");
        self.tasks.push((name, handle));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task to stop and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());

        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Maintenance task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_runs_each_period_until_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut tasks = Maintenance::new();

        let counter = Arc::clone(&runs);
        tasks.spawn_periodic("count", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Nothing runs before the first period elapses.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        tasks.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_task_does_not_hold_up_others() {
        let fast_runs = Arc::new(AtomicUsize::new(0));
        let mut tasks = Maintenance::new();

        tasks.spawn_periodic("slow", Duration::from_secs(1), || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let counter = Arc::clone(&fast_runs);
        tasks.spawn_periodic("fast", Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(fast_runs.load(Ordering::SeqCst), 5);

        // Shutdown abandons the slow run instead of waiting an hour.
        tasks.shutdown().await;
    }
}
