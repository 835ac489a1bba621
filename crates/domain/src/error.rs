//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`TankHubError`]
//! via `#[from]`. Every variant maps onto exactly one [`ErrorKind`], which is
//! what callers (HTTP, MQTT) surface to the outside world.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{ExecutionId, ProcessId};
use crate::role::Role;

/// Top-level error returned by every tankhub component.
#[derive(Debug, thiserror::Error)]
pub enum TankHubError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    #[error("{0}")]
    Conflict(#[from] ConflictError),

    #[error("{0}")]
    DanglingReference(#[from] DanglingReferenceError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Corrupt(#[from] CorruptRecordError),

    /// The backing key-value store could not serve the request.
    #[error("backing store unavailable")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The task dispatch transport could not deliver a command.
    #[error("task dispatch unavailable")]
    Dispatch(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TankHubError {
    /// Wrap any error as a backing-store failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }

    /// Wrap any error as a dispatch failure.
    pub fn dispatch(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Dispatch(Box::new(err))
    }

    /// Classify this error into the externally visible taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::DanglingReference(_) => ErrorKind::DanglingReference,
            Self::Auth(AuthError::Unauthorized) => ErrorKind::Unauthorized,
            Self::Auth(AuthError::Forbidden { .. }) => ErrorKind::Forbidden,
            Self::Corrupt(_) => ErrorKind::CorruptRecord,
            Self::Storage(_) => ErrorKind::StoreUnavailable,
            Self::Dispatch(_) => ErrorKind::DispatchUnavailable,
        }
    }

    /// Whether a caller may retry the same request later with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StoreUnavailable | ErrorKind::DispatchUnavailable
        )
    }
}

/// Externally visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    DanglingReference,
    StoreUnavailable,
    DispatchUnavailable,
    Unauthorized,
    Forbidden,
    CorruptRecord,
}

impl ErrorKind {
    /// Stable string form used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::DanglingReference => "DanglingReference",
            Self::StoreUnavailable => "StoreUnavailable",
            Self::DispatchUnavailable => "DispatchUnavailable",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::CorruptRecord => "CorruptRecord",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed or out-of-range input. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("id must not be empty")]
    EmptyId,

    #[error("a process needs at least one task")]
    NoTasks,

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown status `{0}`")]
    InvalidStatus(String),

    #[error("unknown role `{0}`")]
    InvalidRole(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },

    #[error("task index {index} is out of bounds for a process with {count} tasks")]
    TaskIndexOutOfBounds { index: usize, count: usize },

    #[error("date range starts after it ends")]
    InvertedRange,
}

/// A referenced entity, version or execution does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} `{id}` not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// The requested mutation is incompatible with the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// A start was requested while another execution is still running.
    #[error("process `{process_id}` is already running as execution `{execution_id}`")]
    AlreadyRunning {
        process_id: ProcessId,
        execution_id: ExecutionId,
    },

    /// An edit was requested while the process is in flight.
    #[error("process `{process_id}` cannot be modified while execution `{execution_id}` is running")]
    ProcessRunning {
        process_id: ProcessId,
        execution_id: ExecutionId,
    },

    /// Another caller holds the single-flight lock but its execution record is not visible yet.
    #[error("process `{process_id}` is being started by another caller")]
    StartInProgress { process_id: ProcessId },
}

impl ConflictError {
    /// The execution that caused the conflict, if known.
    #[must_use]
    pub fn execution_id(&self) -> Option<ExecutionId> {
        match self {
            Self::AlreadyRunning { execution_id, .. }
            | Self::ProcessRunning { execution_id, .. } => Some(*execution_id),
            Self::StartInProgress { .. } => None,
        }
    }
}

/// A referential-integrity check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} references missing {referenced} `{id}`")]
pub struct DanglingReferenceError {
    pub entity: &'static str,
    pub referenced: &'static str,
    pub id: String,
}

/// A stored value no longer decodes into its record type. Retrying cannot help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stored value under `{key}` is unreadable: {reason}")]
pub struct CorruptRecordError {
    pub key: String,
    pub reason: String,
}

/// Authentication or role check failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing or unknown credentials")]
    Unauthorized,

    #[error("role `{actual}` is not allowed, `{required}` required")]
    Forbidden { required: Role, actual: Role },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_classify_each_variant_into_its_kind() {
        let cases: Vec<(TankHubError, ErrorKind)> = vec![
            (ValidationError::EmptyName.into(), ErrorKind::InvalidArgument),
            (
                NotFoundError {
                    entity: "Task",
                    id: "t1".to_string(),
                }
                .into(),
                ErrorKind::NotFound,
            ),
            (
                ConflictError::StartInProgress {
                    process_id: ProcessId::new(),
                }
                .into(),
                ErrorKind::Conflict,
            ),
            (
                DanglingReferenceError {
                    entity: "Process",
                    referenced: "Task",
                    id: "missing".to_string(),
                }
                .into(),
                ErrorKind::DanglingReference,
            ),
            (AuthError::Unauthorized.into(), ErrorKind::Unauthorized),
            (
                AuthError::Forbidden {
                    required: Role::Admin,
                    actual: Role::User,
                }
                .into(),
                ErrorKind::Forbidden,
            ),
            (
                CorruptRecordError {
                    key: "process:p1".to_string(),
                    reason: "expected value".to_string(),
                }
                .into(),
                ErrorKind::CorruptRecord,
            ),
            (
                TankHubError::storage(std::io::Error::other("down")),
                ErrorKind::StoreUnavailable,
            ),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn should_only_mark_unavailability_as_retryable() {
        assert!(TankHubError::storage(std::io::Error::other("down")).is_retryable());
        assert!(TankHubError::dispatch(std::io::Error::other("down")).is_retryable());
        assert!(!TankHubError::from(ValidationError::NoTasks).is_retryable());
        let corrupt = TankHubError::from(CorruptRecordError {
            key: "execution:e1".to_string(),
            reason: "EOF while parsing".to_string(),
        });
        assert!(!corrupt.is_retryable());
    }

    #[test]
    fn should_expose_execution_id_of_already_running_conflict() {
        let execution_id = ExecutionId::new();
        let err = ConflictError::AlreadyRunning {
            process_id: ProcessId::new(),
            execution_id,
        };
        assert_eq!(err.execution_id(), Some(execution_id));
    }

    #[test]
    fn should_render_out_of_range_message() {
        let err = ValidationError::OutOfRange {
            field: "maxAgeDays",
            min: 1,
            max: 365,
            value: 400,
        };
        assert_eq!(
            err.to_string(),
            "maxAgeDays must be between 1 and 365, got 400"
        );
    }
}
