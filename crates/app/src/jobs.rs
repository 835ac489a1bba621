//! Background jobs: scheduled retention cleanup and the stale-execution reaper.
//!
//! Both loops stop when the shutdown channel flips to `true` (or its sender
//! is dropped).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ports::{KeyValueStore, TaskDispatcher};
use crate::services::execution_coordinator::ExecutionCoordinator;
use crate::services::log_store::LogStore;

/// Periodically run the retention cleanup when the policy says it is due.
pub fn spawn_retention_scheduler<S>(
    logs: Arc<LogStore<S>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: KeyValueStore + Clone + 'static,
{
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "retention scheduler started");
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    match logs.run_due_cleanup().await {
                        Ok(Some(report)) => {
                            tracing::info!(removed = report.removed, "scheduled cleanup ran");
                        }
                        Ok(None) => tracing::debug!("cleanup not due"),
                        Err(err) => tracing::warn!(error = %err, "scheduled cleanup failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("retention scheduler stopped");
    })
}

/// Periodically fail running executions whose heartbeat is older than `grace`.
pub fn spawn_stale_reaper<S, D>(
    coordinator: Arc<ExecutionCoordinator<S, D>>,
    grace: chrono::Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    tokio::spawn(async move {
        tracing::info!(grace_secs = grace.num_seconds(), "stale execution reaper started");
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    match coordinator.reap_stale(grace).await {
                        Ok(reaped) if !reaped.is_empty() => {
                            tracing::warn!(count = reaped.len(), "reaped stale executions");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "stale execution sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("stale execution reaper stopped");
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use tankhub_domain::id::DeviceId;
    use tankhub_domain::retention::RetentionPolicyPatch;
    use tankhub_domain::time;
    use tankhub_domain::work_log::{WorkLogDraft, WorkLogStatus};

    use super::*;
    use crate::memory_store::InMemoryStore;
    use crate::ports::NoopDispatcher;
    use crate::services::execution_coordinator::CoordinatorSettings;

    #[tokio::test]
    async fn should_stop_scheduler_on_shutdown() {
        let logs = Arc::new(LogStore::new(Arc::new(InMemoryStore::new())));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_retention_scheduler(logs, Duration::from_secs(3600), rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn should_run_due_cleanup_on_tick() {
        let logs = Arc::new(LogStore::new(Arc::new(InMemoryStore::new())));
        logs.update_policy(RetentionPolicyPatch {
            auto_cleanup_enabled: Some(false),
            ..RetentionPolicyPatch::default()
        })
        .await
        .unwrap();
        let mut draft = WorkLogDraft::new(DeviceId::new("pump-1").unwrap(), WorkLogStatus::Completed);
        draft.created_at = Some(time::now() - ChronoDuration::days(60));
        let stale = logs.append(draft).await.unwrap();
        logs.update_policy(RetentionPolicyPatch {
            auto_cleanup_enabled: Some(true),
            ..RetentionPolicyPatch::default()
        })
        .await
        .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = spawn_retention_scheduler(Arc::clone(&logs), Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(logs.get(&stale.id).await.is_err());
    }

    #[tokio::test]
    async fn should_stop_reaper_when_sender_is_dropped() {
        let coordinator = Arc::new(ExecutionCoordinator::new(
            Arc::new(InMemoryStore::new()),
            NoopDispatcher,
            CoordinatorSettings::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_stale_reaper(
            coordinator,
            ChronoDuration::minutes(5),
            Duration::from_secs(3600),
            rx,
        );

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
