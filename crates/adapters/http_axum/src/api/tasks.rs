//! JSON handlers for versioned tasks.

use std::collections::BTreeMap;

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tankhub_app::ports::{KeyValueStore, TaskDispatcher};
use tankhub_app::versioned_store::PutOutcome;
use tankhub_domain::id::{DeviceId, TaskId};
use tankhub_domain::role::Role;
use tankhub_domain::task::{Task, TaskPatch};
use tankhub_domain::time::{self, Timestamp};
use tankhub_domain::version::RecordVersion;

use super::{ApiJson, ApiPath, Envelope, ok};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// Full task snapshot as sent by an editor.
///
/// `updatedAt` is the editor's clock; when omitted the server stamps it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTaskRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub removed: usize,
}

/// `GET /api/tasks`: every current task.
pub async fn list<S, D>(
    State(state): State<AppState<S, D>>,
) -> Result<Envelope<Vec<Task>>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let tasks = state.task_service.list_tasks().await?;
    Ok(ok(tasks))
}

/// `GET /api/tasks/{id}`: current snapshot.
pub async fn get<S, D>(
    State(state): State<AppState<S, D>>,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Envelope<Task>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let task = state.task_service.get_task(&id).await?;
    Ok(ok(task))
}

/// `PUT /api/tasks/{id}`: offer a full snapshot; last write wins.
pub async fn save<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<SaveTaskRequest>,
) -> Result<Envelope<PutOutcome<Task>>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::User)?;
    let task = Task {
        id,
        name: req.name,
        description: req.description,
        device_id: req.device_id,
        action: req.action,
        parameters: req.parameters,
        timeout_secs: req.timeout_secs,
        updated_at: req.updated_at.unwrap_or_else(time::now),
    };
    let outcome = state.task_service.save(task).await?;
    Ok(ok(outcome))
}

/// `PATCH /api/tasks/{id}`: change individual fields of the current snapshot.
pub async fn patch<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(patch): ApiJson<TaskPatch>,
) -> Result<Envelope<PutOutcome<Task>>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::User)?;
    let outcome = state.task_service.patch(&id, patch).await?;
    Ok(ok(outcome))
}

/// `GET /api/tasks/{id}/history`: every archived version, oldest first.
pub async fn history<S, D>(
    State(state): State<AppState<S, D>>,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Envelope<Vec<RecordVersion<Task>>>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let history = state.task_service.history(&id).await?;
    Ok(ok(history))
}

/// `POST /api/tasks/{id}/restore/{version}`: make an old version current.
pub async fn restore<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath((id, version)): ApiPath<(TaskId, u64)>,
) -> Result<Envelope<RecordVersion<Task>>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::User)?;
    let restored = state.task_service.restore(&id, version).await?;
    Ok(ok(restored))
}

/// `DELETE /api/tasks`: wipe every task and its history.
pub async fn clear_all<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
) -> Result<Envelope<Cleared>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::Admin)?;
    let removed = state.task_service.clear_all().await?;
    Ok(ok(Cleared { removed }))
}
