//! HTTP error response mapping.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tankhub_domain::error::{AuthError, ErrorKind, TankHubError, ValidationError};
use tankhub_domain::id::ExecutionId;

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_id: Option<ExecutionId>,
}

/// Maps failures to an HTTP response with the error envelope.
#[derive(Debug)]
pub enum ApiError {
    /// Error raised by a service.
    Domain(TankHubError),
    /// Body or query string that could not be decoded.
    Malformed(String),
}

impl From<TankHubError> for ApiError {
    fn from(err: TankHubError) -> Self {
        Self::Domain(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument | ErrorKind::DanglingReference => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized | ErrorKind::Forbidden => StatusCode::UNAUTHORIZED,
        ErrorKind::StoreUnavailable
        | ErrorKind::DispatchUnavailable
        | ErrorKind::CorruptRecord => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            Self::Malformed(message) => ErrorBody {
                kind: ErrorKind::InvalidArgument,
                message,
                execution_id: None,
            },
            Self::Domain(err) => {
                match &err {
                    TankHubError::Storage(source) | TankHubError::Dispatch(source) => {
                        tracing::error!(error = %source, "{err}");
                    }
                    TankHubError::Corrupt(_) => tracing::error!("{err}"),
                    _ => {}
                }
                ErrorBody {
                    kind: err.kind(),
                    message: err.to_string(),
                    execution_id: match &err {
                        TankHubError::Conflict(conflict) => conflict.execution_id(),
                        _ => None,
                    },
                }
            }
        };

        let status = status_of(body.kind);
        (
            status,
            Json(ErrorEnvelope {
                success: false,
                error: body,
            }),
        )
            .into_response()
    }
}
