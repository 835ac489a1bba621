//! JSON handlers used by devices to report execution progress.

use axum::extract::State;
use serde::Deserialize;
use tankhub_app::ports::{KeyValueStore, TaskDispatcher};
use tankhub_domain::execution::{ProcessExecution, StepReport};
use tankhub_domain::id::ExecutionId;
use tankhub_domain::role::Role;

use super::{ApiJson, ApiPath, Envelope, ok};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// Step result reported by a device.
///
/// Without a `taskIndex` only a failure is meaningful: it fails the whole
/// execution.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    #[serde(default)]
    pub task_index: Option<usize>,
    #[serde(flatten)]
    pub report: StepReport,
}

/// `GET /api/executions/{id}`
pub async fn get<S, D>(
    State(state): State<AppState<S, D>>,
    ApiPath(id): ApiPath<ExecutionId>,
) -> Result<Envelope<ProcessExecution>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let execution = state.coordinator.get_execution(id).await?;
    Ok(ok(execution))
}

/// `POST /api/executions/{id}/advance`
pub async fn advance<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<ExecutionId>,
    ApiJson(req): ApiJson<AdvanceRequest>,
) -> Result<Envelope<ProcessExecution>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::Device)?;
    let execution = match req.task_index {
        Some(task_index) => state.coordinator.advance(id, task_index, req.report).await?,
        None if !req.report.success => {
            let reason = req
                .report
                .message
                .unwrap_or_else(|| "device reported failure".to_string());
            state.coordinator.fail(id, reason).await?
        }
        None => {
            return Err(ApiError::Malformed(
                "taskIndex is required unless success is false".to_string(),
            ));
        }
    };
    Ok(ok(execution))
}

/// `POST /api/executions/{id}/heartbeat`
pub async fn heartbeat<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<ExecutionId>,
) -> Result<Envelope<ExecutionId>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::Device)?;
    state.coordinator.heartbeat(id).await?;
    Ok(ok(id))
}
