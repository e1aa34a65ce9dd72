use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument};

use super::checker::CapacityChecker;

/// Runs the capacity check on a fixed interval.
pub struct CapacityWorker {
    checker: Arc<CapacityChecker>,
    interval: Duration,
}

impl CapacityWorker {
    pub fn new(checker: Arc<CapacityChecker>, interval: Duration) -> Self {
        Self { checker, interval }
    }

    /// Run until shutdown is signaled. A pass still in flight at shutdown is
    /// abandoned.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting capacity worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tokio::select! {
                        result = self.checker.run() => {
                            if let Err(e) = result {
                                error!(error = %e, "Capacity check failed");
                            }
                        }
                        _ = shutdown.changed() => {
                            info!("Capacity worker shutting down mid-run");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Capacity worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::checker::CheckerConfig;
    use crate::capacity::model::PoolCategory;
    use crate::push::LogSender;
    use crate::store::MemoryStore;
    use chrono::{TimeDelta, Utc};
    use laterq_id::UserId;

    #[tokio::test(start_paused = true)]
    async fn test_worker_runs_on_interval_and_stops() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let active = store.add_pool(owner, PoolCategory::Active).await;
        let pending = store.add_pool(owner, PoolCategory::Pending).await;
        let mut tasks = Vec::new();
        for _ in 0..10 {
            tasks.push(store.add_task(active.id, Utc::now() - TimeDelta::days(2)).await);
        }

        let checker = Arc::new(CapacityChecker::new(
            Arc::new(store.clone()),
            Arc::new(LogSender),
            CheckerConfig::default(),
        ));
        let worker = CapacityWorker::new(checker, Duration::from_secs(60));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_secs(90)).await;
        let _ = shutdown_tx.send(true);
        handle.await.unwrap();

        // 2d each: boundary at index 4, tasks 4.. move.
        assert_eq!(store.task(tasks[3].id).await.unwrap().pool_id, Some(active.id));
        assert_eq!(store.task(tasks[4].id).await.unwrap().pool_id, Some(pending.id));
        assert_eq!(store.notifications_for(owner).await.len(), 6);
        assert_eq!(store.open_sessions(), 0);
    }
}
