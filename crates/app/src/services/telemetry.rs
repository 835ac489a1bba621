//! Concrete [`TelemetrySink`] backed by application services.

use std::sync::Arc;

use tankhub_domain::error::TankHubError;
use tankhub_domain::execution::StepReport;
use tankhub_domain::id::ExecutionId;
use tankhub_domain::work_log::{WorkLog, WorkLogDraft};

use crate::ports::{KeyValueStore, TaskDispatcher, TelemetrySink};
use crate::services::execution_coordinator::ExecutionCoordinator;
use crate::services::log_store::LogStore;

/// [`TelemetrySink`] implementation that delegates to the [`LogStore`] and
/// the [`ExecutionCoordinator`].
///
/// The generic parameters are confined to this struct: transports see only
/// the [`TelemetrySink`] trait.
pub struct ServiceTelemetry<S, D> {
    logs: Arc<LogStore<S>>,
    coordinator: Arc<ExecutionCoordinator<S, D>>,
}

impl<S, D> ServiceTelemetry<S, D> {
    /// Create a new sink backed by the given services.
    pub fn new(logs: Arc<LogStore<S>>, coordinator: Arc<ExecutionCoordinator<S, D>>) -> Self {
        Self { logs, coordinator }
    }
}

impl<S, D> Clone for ServiceTelemetry<S, D> {
    fn clone(&self) -> Self {
        Self {
            logs: Arc::clone(&self.logs),
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<S, D> TelemetrySink for ServiceTelemetry<S, D>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    async fn record_log(&self, draft: WorkLogDraft) -> Result<WorkLog, TankHubError> {
        self.logs.append(draft).await
    }

    async fn record_step(
        &self,
        execution_id: ExecutionId,
        task_index: usize,
        report: StepReport,
    ) -> Result<(), TankHubError> {
        self.coordinator
            .advance(execution_id, task_index, report)
            .await
            .map(|_| ())
    }

    async fn record_failure(
        &self,
        execution_id: ExecutionId,
        message: String,
    ) -> Result<(), TankHubError> {
        self.coordinator
            .fail(execution_id, message)
            .await
            .map(|_| ())
    }

    async fn record_heartbeat(&self, execution_id: ExecutionId) -> Result<(), TankHubError> {
        self.coordinator.heartbeat(execution_id).await
    }
}
