//! JSON API handlers and the `/api` sub-router.

#[allow(clippy::missing_errors_doc)]
pub mod executions;
#[allow(clippy::missing_errors_doc)]
pub mod logs;
#[allow(clippy::missing_errors_doc)]
pub mod processes;
#[allow(clippy::missing_errors_doc)]
pub mod tasks;

use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tankhub_app::ports::{KeyValueStore, TaskDispatcher};

use crate::error::ApiError;
use crate::state::AppState;

/// `axum::Json` whose rejection uses the API error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` whose rejection uses the API error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// `axum::extract::Path` whose rejection uses the API error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

#[derive(Serialize)]
struct SuccessEnvelope<T> {
    success: bool,
    data: T,
}

/// Successful response wrapped as `{ "success": true, "data": ... }`.
pub struct Envelope<T> {
    status: StatusCode,
    data: T,
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(SuccessEnvelope {
                success: true,
                data: self.data,
            }),
        )
            .into_response()
    }
}

/// `200 OK` with `data`.
pub fn ok<T: Serialize>(data: T) -> Envelope<T> {
    Envelope {
        status: StatusCode::OK,
        data,
    }
}

/// `201 Created` with `data`.
pub fn created<T: Serialize>(data: T) -> Envelope<T> {
    Envelope {
        status: StatusCode::CREATED,
        data,
    }
}

/// Build the `/api` sub-router.
pub fn routes<S, D>() -> Router<AppState<S, D>>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    Router::new()
        // Tasks
        .route(
            "/tasks",
            get(tasks::list::<S, D>).delete(tasks::clear_all::<S, D>),
        )
        .route(
            "/tasks/{id}",
            get(tasks::get::<S, D>)
                .put(tasks::save::<S, D>)
                .patch(tasks::patch::<S, D>),
        )
        .route("/tasks/{id}/history", get(tasks::history::<S, D>))
        .route(
            "/tasks/{id}/restore/{version}",
            post(tasks::restore::<S, D>),
        )
        // Processes
        .route(
            "/processes",
            get(processes::list::<S, D>).post(processes::create::<S, D>),
        )
        .route(
            "/processes/{id}",
            get(processes::get::<S, D>)
                .put(processes::update::<S, D>)
                .delete(processes::delete::<S, D>),
        )
        .route("/processes/{id}/start", post(processes::start::<S, D>))
        .route("/processes/{id}/stop", post(processes::stop::<S, D>))
        .route("/processes/{id}/status", get(processes::status::<S, D>))
        // Executions
        .route("/executions/{id}", get(executions::get::<S, D>))
        .route(
            "/executions/{id}/advance",
            post(executions::advance::<S, D>),
        )
        .route(
            "/executions/{id}/heartbeat",
            post(executions::heartbeat::<S, D>),
        )
        // Logs
        .route(
            "/logs",
            get(logs::list::<S, D>).post(logs::append::<S, D>),
        )
        .route("/logs/stats", get(logs::stats::<S, D>))
        .route("/logs/cleanup", post(logs::cleanup::<S, D>))
        .route(
            "/logs/retention",
            get(logs::policy::<S, D>).put(logs::update_policy::<S, D>),
        )
        .route(
            "/logs/{id}",
            get(logs::get::<S, D>).patch(logs::patch::<S, D>),
        )
}
