//! Telemetry port: what device-facing transports report back into the core.
//!
//! This is the inbound counterpart of [`TaskDispatcher`](super::TaskDispatcher):
//! adapters (MQTT) call it when a device publishes a log, a step result or a
//! heartbeat. [`ServiceTelemetry`](crate::services::telemetry::ServiceTelemetry)
//! implements it on top of the `LogStore` and the `ExecutionCoordinator`.

use std::future::Future;

use tankhub_domain::error::TankHubError;
use tankhub_domain::execution::StepReport;
use tankhub_domain::id::ExecutionId;
use tankhub_domain::work_log::{WorkLog, WorkLogDraft};

/// Sink for device-originated messages.
pub trait TelemetrySink: Send + Sync {
    /// Store a work log reported by a device.
    fn record_log(
        &self,
        draft: WorkLogDraft,
    ) -> impl Future<Output = Result<WorkLog, TankHubError>> + Send;

    /// Record the result of one step of a running execution.
    fn record_step(
        &self,
        execution_id: ExecutionId,
        task_index: usize,
        report: StepReport,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send;

    /// Fail a running execution outright.
    fn record_failure(
        &self,
        execution_id: ExecutionId,
        message: String,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send;

    /// Refresh the liveness of a running execution.
    fn record_heartbeat(
        &self,
        execution_id: ExecutionId,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send;
}
