//! JSON handlers for device work logs and the retention policy.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use tankhub_app::ports::{KeyValueStore, TaskDispatcher};
use tankhub_app::services::log_store::{CleanupReport, LogPage, LogQuery, LogStats};
use tankhub_domain::id::LogId;
use tankhub_domain::retention::{RetentionPolicy, RetentionPolicyPatch};
use tankhub_domain::role::Role;
use tankhub_domain::work_log::{WorkLog, WorkLogDraft, WorkLogPatch};

use super::{ApiJson, ApiPath, ApiQuery, Envelope, created, ok};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .or_else(|| header(headers, "x-real-ip"))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// `GET /api/logs`: filtered, newest first, paginated.
pub async fn list<S, D>(
    State(state): State<AppState<S, D>>,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> Result<Envelope<LogPage>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let page = state.log_store.query(&query).await?;
    Ok(ok(page))
}

/// `POST /api/logs`: append (or upsert by id) a device log.
pub async fn append<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    headers: HeaderMap,
    ApiJson(mut draft): ApiJson<WorkLogDraft>,
) -> Result<Envelope<WorkLog>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::Device)?;
    if draft.client_ip.is_empty()
        && let Some(ip) = client_ip(&headers)
    {
        draft.client_ip = ip;
    }
    if draft.user_agent.is_empty()
        && let Some(agent) = header(&headers, USER_AGENT.as_str())
    {
        draft.user_agent = agent.to_string();
    }
    let log = state.log_store.append(draft).await?;
    Ok(created(log))
}

/// `GET /api/logs/{id}`
pub async fn get<S, D>(
    State(state): State<AppState<S, D>>,
    ApiPath(id): ApiPath<LogId>,
) -> Result<Envelope<WorkLog>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let log = state.log_store.get(&id).await?;
    Ok(ok(log))
}

/// `PATCH /api/logs/{id}`
pub async fn patch<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiPath(id): ApiPath<LogId>,
    ApiJson(patch): ApiJson<WorkLogPatch>,
) -> Result<Envelope<WorkLog>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::Device)?;
    let log = state.log_store.patch(&id, patch).await?;
    Ok(ok(log))
}

/// `GET /api/logs/stats`
pub async fn stats<S, D>(
    State(state): State<AppState<S, D>>,
) -> Result<Envelope<LogStats>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let stats = state.log_store.stats().await?;
    Ok(ok(stats))
}

/// `POST /api/logs/cleanup`: run retention now.
pub async fn cleanup<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
) -> Result<Envelope<CleanupReport>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::Admin)?;
    let report = state.log_store.cleanup().await?;
    Ok(ok(report))
}

/// `GET /api/logs/retention`
pub async fn policy<S, D>(
    State(state): State<AppState<S, D>>,
) -> Result<Envelope<RetentionPolicy>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    let policy = state.log_store.policy().await?;
    Ok(ok(policy))
}

/// `PUT /api/logs/retention`: validated partial update.
pub async fn update_policy<S, D>(
    State(state): State<AppState<S, D>>,
    caller: Caller,
    ApiJson(patch): ApiJson<RetentionPolicyPatch>,
) -> Result<Envelope<RetentionPolicy>, ApiError>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    caller.require(Role::Admin)?;
    let policy = state.log_store.update_policy(patch).await?;
    Ok(ok(policy))
}
