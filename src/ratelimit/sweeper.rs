//! Background eviction of expired rate limit entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::RateLimiter;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic sweeper that bounds the limiter's memory.
///
/// Correctness of [`RateLimiter::check_rate_limit`] does not depend on the
/// sweeper; expired entries are already treated as absent on lookup.
pub struct Sweeper;

impl Sweeper {
    /// Spawn a task that calls [`RateLimiter::evict_expired`] every `interval`.
    ///
    /// Must be called from within a tokio runtime. A zero `interval` is raised
    /// to one millisecond. The first sweep happens one full interval after start.
    pub fn start<C>(limiter: Arc<RateLimiter<C>>, interval: Duration) -> SweeperHandle
    where
        C: Clock + 'static,
    {
        let interval = interval.max(MIN_INTERVAL);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_expired();
                        debug!(evicted = evicted, "Rate limit sweep complete");
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        info!(interval_secs = interval.as_secs_f64(), "Rate limit sweeper started");

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running sweeper. Dropping it also stops the task.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its task to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Rate limit sweeper stopped");
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
