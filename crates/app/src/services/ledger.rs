//! Execution records shared by the registry and the coordinator.

use std::collections::HashMap;

use tankhub_domain::error::{NotFoundError, TankHubError};
use tankhub_domain::execution::ProcessExecution;
use tankhub_domain::id::{ExecutionId, ProcessId};

use crate::collection::Collection;
use crate::ports::KeyValueStore;

pub(crate) const EXECUTION_NAMESPACE: &str = "execution";

/// Typed access to `execution:{id}` records.
pub(crate) struct ExecutionLedger<S> {
    executions: Collection<S, ProcessExecution>,
}

impl<S: KeyValueStore> ExecutionLedger<S> {
    pub(crate) fn new(store: S) -> Self {
        Self {
            executions: Collection::new(store, EXECUTION_NAMESPACE),
        }
    }

    pub(crate) async fn get(&self, id: ExecutionId) -> Result<ProcessExecution, TankHubError> {
        self.executions
            .get(&id.to_string())
            .await?
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Execution",
                    id: id.to_string(),
                }
                .into()
            })
    }

    pub(crate) async fn save(&self, execution: &ProcessExecution) -> Result<(), TankHubError> {
        self.executions
            .put(&execution.id.to_string(), execution)
            .await
    }

    pub(crate) async fn all(&self) -> Result<Vec<ProcessExecution>, TankHubError> {
        self.executions.all().await
    }

    /// Executions of one process, newest first by start time.
    pub(crate) async fn for_process(
        &self,
        process_id: ProcessId,
    ) -> Result<Vec<ProcessExecution>, TankHubError> {
        let mut executions: Vec<ProcessExecution> = self
            .all()
            .await?
            .into_iter()
            .filter(|e| e.process_id == process_id)
            .collect();
        executions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(executions)
    }

    /// The running execution of a process, if any.
    ///
    /// Should more than one be running, the most recently started one is
    /// reported.
    pub(crate) async fn find_running(
        &self,
        process_id: ProcessId,
    ) -> Result<Option<ProcessExecution>, TankHubError> {
        Ok(self
            .for_process(process_id)
            .await?
            .into_iter()
            .find(ProcessExecution::is_running))
    }

    /// Running execution id per process, in one scan.
    pub(crate) async fn running_by_process(
        &self,
    ) -> Result<HashMap<ProcessId, ExecutionId>, TankHubError> {
        let mut running = HashMap::new();
        for execution in self.all().await?.into_iter().filter(ProcessExecution::is_running) {
            running.insert(execution.process_id, execution.id);
        }
        Ok(running)
    }
}
