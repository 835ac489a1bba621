//! Execution coordinator: single-flight bookkeeping of process runs.
//!
//! At most one execution per process is `running`. `start` guards the
//! check-then-create window with a short-lived `lock:running:{processId}` key
//! written via [`KeyValueStore::set_if_absent`]; once the running record is
//! persisted it is the record itself that blocks further starts. The lock
//! holds the new execution id and is released with
//! [`KeyValueStore::delete_if_value`], so an expired lock re-acquired by
//! another caller is left alone.

use std::time::Duration;

use serde::Serialize;
use tankhub_domain::error::{ConflictError, NotFoundError, TankHubError};
use tankhub_domain::execution::{
    ExecutionStatus, HEARTBEAT_TIMEOUT, ProcessExecution, STOPPED_BY_USER, StepOutcome, StepReport,
};
use tankhub_domain::id::{ExecutionId, ProcessId};
use tankhub_domain::process::AutomationProcess;
use tankhub_domain::task::Task;
use tankhub_domain::time;

use crate::collection::Collection;
use crate::ports::{DispatchStep, KeyValueStore, StartCommand, StopCommand, TaskDispatcher};
use crate::services::ledger::ExecutionLedger;
use crate::services::process_registry::PROCESS_NAMESPACE;
use crate::services::task_service::TASK_NAMESPACE;
use crate::versioned_store::VersionedStore;

const LOCK_NAMESPACE: &str = "lock:running";

/// Tunables of the [`ExecutionCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Lifetime of the start lock if its holder never releases it.
    pub lock_ttl: Duration,
    /// How many past executions [`ExecutionCoordinator::status`] reports.
    pub recent_limit: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(30),
            recent_limit: 10,
        }
    }
}

/// Answer of [`ExecutionCoordinator::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatusReport {
    pub process_id: ProcessId,
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<ProcessExecution>,
    /// Newest first by start time.
    pub recent: Vec<ProcessExecution>,
}

/// Application service driving process executions.
pub struct ExecutionCoordinator<S, D> {
    store: S,
    processes: Collection<S, AutomationProcess>,
    tasks: VersionedStore<S, Task>,
    ledger: ExecutionLedger<S>,
    dispatcher: D,
    settings: CoordinatorSettings,
}

impl<S, D> ExecutionCoordinator<S, D>
where
    S: KeyValueStore + Clone,
    D: TaskDispatcher,
{
    /// Create a new coordinator over `store`, dispatching through `dispatcher`.
    pub fn new(store: S, dispatcher: D, settings: CoordinatorSettings) -> Self {
        Self {
            processes: Collection::new(store.clone(), PROCESS_NAMESPACE),
            tasks: VersionedStore::new(store.clone(), TASK_NAMESPACE),
            ledger: ExecutionLedger::new(store.clone()),
            store,
            dispatcher,
            settings,
        }
    }

    /// Start a new execution of a process.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the process does not exist,
    /// [`TankHubError::Conflict`] if it is already running (or another caller
    /// is starting it right now), [`TankHubError::Dispatch`] if the dispatcher
    /// refused the run (the execution is then recorded as `error`), or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, process_id: ProcessId) -> Result<ProcessExecution, TankHubError> {
        let process = self
            .processes
            .get(&process_id.to_string())
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "Process",
                id: process_id.to_string(),
            })?;

        if let Some(running) = self.ledger.find_running(process_id).await? {
            return Err(already_running(process_id, &running));
        }
        // Resolved before anything is written so a failed read leaves no run behind.
        let steps = self.dispatch_steps(&process).await?;

        let mut execution = ProcessExecution::start(
            process.id,
            process.task_count(),
            process.config.continue_on_error,
            time::now(),
        );
        let lock_key = lock_key(process_id);
        let lock_token = execution.id.to_string();
        let acquired = self
            .store
            .set_if_absent(&lock_key, lock_token.clone(), Some(self.settings.lock_ttl))
            .await?;
        if !acquired {
            return Err(match self.ledger.find_running(process_id).await? {
                Some(running) => already_running(process_id, &running),
                None => ConflictError::StartInProgress { process_id }.into(),
            });
        }

        let created = self.create_locked(&execution).await;
        self.release_lock(&lock_key, &lock_token).await;
        created?;
        tracing::info!(execution_id = %execution.id, "execution started");

        let command = StartCommand {
            execution_id: execution.id,
            process_id: process.id,
            process_name: process.name.clone(),
            config: process.config.clone(),
            steps,
        };
        if let Err(err) = self.dispatcher.dispatch_start(command).await {
            tracing::error!(execution_id = %execution.id, error = %err, "dispatch failed");
            execution.finish(
                ExecutionStatus::Error,
                Some(format!("dispatch failed: {err}")),
                time::now(),
            );
            self.ledger.save(&execution).await?;
            return Err(err);
        }
        Ok(execution)
    }

    async fn create_locked(&self, execution: &ProcessExecution) -> Result<(), TankHubError> {
        if let Some(running) = self.ledger.find_running(execution.process_id).await? {
            return Err(already_running(execution.process_id, &running));
        }
        self.ledger.save(execution).await
    }

    /// Drop the start lock unless it expired and another caller took it over.
    async fn release_lock(&self, lock_key: &str, lock_token: &str) {
        match self.store.delete_if_value(lock_key, lock_token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("start lock expired before release, left to its new owner"),
            Err(err) => tracing::warn!(error = %err, "failed to release start lock, it will expire"),
        }
    }

    async fn dispatch_steps(
        &self,
        process: &AutomationProcess,
    ) -> Result<Vec<DispatchStep>, TankHubError> {
        let mut steps = Vec::with_capacity(process.task_count());
        for (index, task_id) in process.task_ids.iter().enumerate() {
            let task = self.tasks.get(task_id.as_str()).await?.map(|v| v.snapshot);
            steps.push(DispatchStep {
                index,
                task_id: task_id.clone(),
                task,
            });
        }
        Ok(steps)
    }

    /// Stop the running execution of a process.
    ///
    /// The stop signal is forwarded to the dispatcher on a best-effort basis:
    /// the execution is `stopped` even when the signal cannot be delivered.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] when nothing is running, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self, process_id: ProcessId) -> Result<ProcessExecution, TankHubError> {
        let mut execution = self
            .ledger
            .find_running(process_id)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "Running execution",
                id: process_id.to_string(),
            })?;
        execution.finish(
            ExecutionStatus::Stopped,
            Some(STOPPED_BY_USER.to_string()),
            time::now(),
        );
        self.ledger.save(&execution).await?;
        tracing::info!(execution_id = %execution.id, "execution stopped");

        self.signal_stop(&execution, STOPPED_BY_USER).await;
        Ok(execution)
    }

    async fn signal_stop(&self, execution: &ProcessExecution, reason: &str) {
        let command = StopCommand {
            execution_id: execution.id,
            process_id: execution.process_id,
            reason: reason.to_string(),
        };
        if let Err(err) = self.dispatcher.dispatch_stop(command).await {
            tracing::warn!(execution_id = %execution.id, error = %err, "stop signal not delivered");
        }
    }

    /// Whether a process is running, and its most recent executions.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self, process_id: ProcessId) -> Result<ExecutionStatusReport, TankHubError> {
        let executions = self.ledger.for_process(process_id).await?;
        let running = executions.iter().find(|e| e.is_running()).cloned();
        let recent = executions
            .into_iter()
            .take(self.settings.recent_limit)
            .collect();
        Ok(ExecutionStatusReport {
            process_id,
            is_running: running.is_some(),
            running,
            recent,
        })
    }

    /// Record the result of step `task_index` of a running execution.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the execution does not exist or
    /// is no longer running, [`TankHubError::Validation`] if `task_index` is
    /// out of bounds, or a storage error.
    #[tracing::instrument(skip(self, report))]
    pub async fn advance(
        &self,
        execution_id: ExecutionId,
        task_index: usize,
        report: StepReport,
    ) -> Result<ProcessExecution, TankHubError> {
        let mut execution = self.ledger.get(execution_id).await?;
        let outcome = execution.record_step(task_index, report, time::now())?;
        self.ledger.save(&execution).await?;
        match outcome {
            StepOutcome::Advanced => tracing::debug!("step recorded"),
            StepOutcome::Completed => tracing::info!("execution completed"),
            StepOutcome::Failed => tracing::warn!(error = ?execution.error, "execution failed"),
        }
        Ok(execution)
    }

    /// Move a running execution to `error`.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the execution does not exist or is
    /// not running, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn fail(
        &self,
        execution_id: ExecutionId,
        message: String,
    ) -> Result<ProcessExecution, TankHubError> {
        let mut execution = self.ledger.get(execution_id).await?;
        execution.ensure_running()?;
        execution.finish(ExecutionStatus::Error, Some(message), time::now());
        self.ledger.save(&execution).await?;
        tracing::warn!("execution marked as failed");
        Ok(execution)
    }

    /// Refresh the liveness of a running execution.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the execution does not exist or is
    /// not running, or a storage error.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn heartbeat(&self, execution_id: ExecutionId) -> Result<(), TankHubError> {
        let mut execution = self.ledger.get(execution_id).await?;
        execution.beat(time::now())?;
        self.ledger.save(&execution).await
    }

    /// Fetch one execution by id.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if it does not exist, or a storage error.
    pub async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ProcessExecution, TankHubError> {
        self.ledger.get(execution_id).await
    }

    /// Fail every running execution silent for longer than `grace`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store. Executions reaped
    /// before the failure stay reaped.
    #[tracing::instrument(skip(self))]
    pub async fn reap_stale(&self, grace: chrono::Duration) -> Result<Vec<ExecutionId>, TankHubError> {
        let now = time::now();
        let mut reaped = Vec::new();
        for mut execution in self.ledger.all().await? {
            if !execution.is_stale(now, grace) {
                continue;
            }
            execution.finish(
                ExecutionStatus::Error,
                Some(HEARTBEAT_TIMEOUT.to_string()),
                now,
            );
            self.ledger.save(&execution).await?;
            tracing::warn!(execution_id = %execution.id, "execution reaped after heartbeat timeout");
            self.signal_stop(&execution, HEARTBEAT_TIMEOUT).await;
            reaped.push(execution.id);
        }
        Ok(reaped)
    }
}

fn lock_key(process_id: ProcessId) -> String {
    format!("{LOCK_NAMESPACE}:{process_id}")
}

fn already_running(process_id: ProcessId, running: &ProcessExecution) -> TankHubError {
    ConflictError::AlreadyRunning {
        process_id,
        execution_id: running.id,
    }
    .into()
}
