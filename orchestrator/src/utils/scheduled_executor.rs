//! Generic periodic-task runner.
//!
//! A `ScheduledTask` is polled on a fixed interval until it signals
//! termination. Used by the health prober (§5) to probe every configured
//! server on a jittered tick without hand-rolling a `tokio::spawn` loop at
//! each call site.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// A unit of periodic work.
pub trait ScheduledTask: Send + Sync {
    /// Run one iteration. Errors are logged by the executor; they do not
    /// stop the schedule.
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>>;

    /// Polled after every tick; when true the executor stops scheduling
    /// further runs.
    fn should_terminate(&self) -> bool {
        false
    }
}

/// Drives a `ScheduledTask` on a fixed interval, jittered by up to ±20% to
/// avoid every instance of a service waking in lock-step.
pub struct ScheduledExecutor {
    name: String,
    interval: Duration,
}

impl ScheduledExecutor {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self { name: name.into(), interval }
    }

    pub async fn start<T: ScheduledTask>(&self, task: T) {
        loop {
            if task.should_terminate() {
                tracing::info!(task = %self.name, "scheduled task stopping");
                return;
            }

            if let Err(e) = task.run().await {
                error!(task = %self.name, error = %e, "scheduled task iteration failed");
            }

            let jitter = self.jittered_interval();
            tokio::time::sleep(jitter).await;
        }
    }

    fn jittered_interval(&self) -> Duration {
        let base = self.interval.as_millis() as i64;
        if base <= 0 {
            warn!(task = %self.name, "non-positive interval, defaulting to 1s");
            return Duration::from_secs(1);
        }
        let spread = base / 5; // ±20%
        let delta = if spread > 0 { rand::thread_rng().gen_range(-spread..=spread) } else { 0 };
        let millis = (base + delta).max(1) as u64;
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTask {
        count: Arc<AtomicUsize>,
        limit: usize,
    }

    impl ScheduledTask for CountingTask {
        fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
            Box::pin(async move {
                self.count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }

        fn should_terminate(&self) -> bool {
            self.count.load(Ordering::SeqCst) >= self.limit
        }
    }

    #[tokio::test]
    async fn stops_after_limit_reached() {
        let count = Arc::new(AtomicUsize::new(0));
        let task = CountingTask { count: count.clone(), limit: 3 };
        let executor = ScheduledExecutor::new("test", Duration::from_millis(1));
        executor.start(task).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let executor = ScheduledExecutor::new("test", Duration::from_secs(10));
        for _ in 0..50 {
            let d = executor.jittered_interval();
            assert!(d.as_millis() >= 8000 && d.as_millis() <= 12000);
        }
    }
}
