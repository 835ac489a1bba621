//! JSON handlers for automation processes and their executions.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tankhub_app::ports::{KeyValueStore, TaskDispatcher};
use tankhub_app::services::execution_coordinator::ExecutionStatusReport;
use tankhub_app::services::process_registry::{NewProcess, ProcessView};
use tankhub_domain::execution::ProcessExecution;
use tankhub_domain::id::ProcessId;
use tankhub_domain::process::{AutomationProcess, ProcessPatch};
use tankhub_domain::role::Role;

use super::{ApiJson, ApiPath, ApiQuery, Envelope, created, ok};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;

/// Query string of the list endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: ProcessId,
}

/// `GET /api/processes`: newest first, with resolved tasks.
pub async fn list<S, D>(
    State(state): State<AppState<S, D>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Envelope<Vec<ProcessView>>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let processes = state.process_registry.list(limit).await?;
    Ok(ok(processes))
}

/// `POST /api/processes`: define a new process.
pub async fn create<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiJson(input): ApiJson<NewProcess>,
) -> Result<Envelope<AutomationProcess>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::User)?;
    let process = state.process_registry.create(input).await?;
    Ok(created(process))
}

/// `GET /api/processes/{id}`
pub async fn get<S, D>(
    State(state): State<AppState<S, D>>,
    ApiPath(id): ApiPath<ProcessId>,
) -> Result<Envelope<ProcessView>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let view = state.process_registry.get(id).await?;
    Ok(ok(view))
}

/// `PUT /api/processes/{id}`: rejected while the process is running.
pub async fn update<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<ProcessId>,
    ApiJson(patch): ApiJson<ProcessPatch>,
) -> Result<Envelope<AutomationProcess>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::User)?;
    let process = state.process_registry.update(id, patch).await?;
    Ok(ok(process))
}

/// `DELETE /api/processes/{id}`: rejected while the process is running.
pub async fn delete<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<ProcessId>,
) -> Result<Envelope<Deleted>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::User)?;
    state.process_registry.delete(id).await?;
    Ok(ok(Deleted { id }))
}

/// `POST /api/processes/{id}/start`
pub async fn start<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<ProcessId>,
) -> Result<Envelope<ProcessExecution>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::User)?;
    let execution = state.coordinator.start(id).await?;
    Ok(created(execution))
}

/// `POST /api/processes/{id}/stop`
pub async fn stop<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<ProcessId>,
) -> Result<Envelope<ProcessExecution>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::User)?;
    let execution = state.coordinator.stop(id).await?;
    Ok(ok(execution))
}

/// `GET /api/processes/{id}/status`: running execution and recent history.
pub async fn status<S, D>(
    State(state): State<AppState<S, D>>,
    ApiPath(id): ApiPath<ProcessId>,
) -> Result<Envelope<ExecutionStatusReport>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let report = state.coordinator.status(id).await?;
    Ok(ok(report))
}
