//! JSON payloads exchanged with devices.

use serde::{Deserialize, Serialize};
use tankhub_app::ports::{StartCommand, StopCommand};
use tankhub_domain::execution::StepReport;
use tankhub_domain::id::{DeviceId, ExecutionId, ProcessId};
use tankhub_domain::process::ProcessConfig;
use tankhub_domain::task::Task;
use tankhub_domain::work_log::WorkLogDraft;

use crate::error::MqttError;

/// Published on `{base}/processes/{processId}/start`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartPayload {
    pub execution_id: ExecutionId,
    pub process_id: ProcessId,
    pub name: String,
    pub config: ProcessConfig,
    /// `null` entries mark tasks deleted since the process was saved.
    pub tasks: Vec<Option<Task>>,
}

impl From<StartCommand> for StartPayload {
    fn from(command: StartCommand) -> Self {
        Self {
            execution_id: command.execution_id,
            process_id: command.process_id,
            name: command.process_name,
            config: command.config,
            tasks: command.steps.into_iter().map(|step| step.task).collect(),
        }
    }
}

/// Published on `{base}/processes/{processId}/stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StopPayload {
    pub execution_id: ExecutionId,
    pub process_id: ProcessId,
    pub reason: String,
}

impl From<StopCommand> for StopPayload {
    fn from(command: StopCommand) -> Self {
        Self {
            execution_id: command.execution_id,
            process_id: command.process_id,
            reason: command.reason,
        }
    }
}

/// Received on `{base}/executions/{executionId}/step`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StepPayload {
    #[serde(default)]
    pub task_index: Option<usize>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, alias = "result")]
    pub output: serde_json::Value,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl StepPayload {
    pub fn report(self) -> StepReport {
        StepReport {
            success: self.success,
            output: self.output,
            message: self.message,
        }
    }
}

/// Encode an outgoing payload.
pub(crate) fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, MqttError> {
    serde_json::to_vec(payload).map_err(MqttError::PayloadEncode)
}

/// Decode a device log, taking the device id from the topic.
///
/// A `deviceId` inside the payload is overwritten so a device can only
/// report under its own topic.
pub(crate) fn decode_log(device_id: &DeviceId, payload: &[u8]) -> Result<WorkLogDraft, MqttError> {
    let mut value: serde_json::Value =
        serde_json::from_slice(payload).map_err(MqttError::PayloadParse)?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "deviceId".to_string(),
            serde_json::Value::String(device_id.to_string()),
        );
    }
    serde_json::from_value(value).map_err(MqttError::PayloadParse)
}

pub(crate) fn decode_step(payload: &[u8]) -> Result<StepPayload, MqttError> {
    serde_json::from_slice(payload).map_err(MqttError::PayloadParse)
}
