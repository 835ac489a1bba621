//! Task dispatch port: how the coordinator tells devices to run or stop work.
//!
//! The coordinator only does bookkeeping. Whatever actually drives the pumps
//! and valves sits behind [`TaskDispatcher`] and reports progress back through
//! `advance` / `heartbeat` on the coordinator.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tankhub_domain::error::TankHubError;
use tankhub_domain::id::{ExecutionId, ProcessId, TaskId};
use tankhub_domain::process::ProcessConfig;
use tankhub_domain::task::Task;

/// One step of a started execution, in process order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStep {
    pub index: usize,
    pub task_id: TaskId,
    /// `None` when the task was deleted after the process was saved.
    pub task: Option<Task>,
}

/// Request to begin running a freshly created execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCommand {
    pub execution_id: ExecutionId,
    pub process_id: ProcessId,
    pub process_name: String,
    pub config: ProcessConfig,
    pub steps: Vec<DispatchStep>,
}

/// Request to abort an execution that is no longer running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopCommand {
    pub execution_id: ExecutionId,
    pub process_id: ProcessId,
    pub reason: String,
}

/// Outbound transport for execution commands.
pub trait TaskDispatcher: Send + Sync {
    /// Hand a new execution to the devices.
    ///
    /// An error here means the execution could not be started and is
    /// recorded as failed by the caller.
    fn dispatch_start(
        &self,
        command: StartCommand,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send;

    /// Tell the devices an execution ended early.
    fn dispatch_stop(
        &self,
        command: StopCommand,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send;
}

impl<T: TaskDispatcher> TaskDispatcher for Arc<T> {
    fn dispatch_start(
        &self,
        command: StartCommand,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send {
        (**self).dispatch_start(command)
    }

    fn dispatch_stop(
        &self,
        command: StopCommand,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send {
        (**self).dispatch_stop(command)
    }
}

/// Dispatcher that only logs. Used when no device transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

impl TaskDispatcher for NoopDispatcher {
    fn dispatch_start(
        &self,
        command: StartCommand,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send {
        tracing::debug!(
            execution_id = %command.execution_id,
            process_id = %command.process_id,
            steps = command.steps.len(),
            "no dispatcher configured, start not forwarded"
        );
        async { Ok(()) }
    }

    fn dispatch_stop(
        &self,
        command: StopCommand,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send {
        tracing::debug!(
            execution_id = %command.execution_id,
            reason = %command.reason,
            "no dispatcher configured, stop not forwarded"
        );
        async { Ok(()) }
    }
}
