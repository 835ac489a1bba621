//! Work log: a status record reported by a device while running a task.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::{DeviceId, LogId, TaskId};
use crate::time::Timestamp;

/// Status reported by a device for one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkLogStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl fmt::Display for WorkLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkLogStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

/// A stored work log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkLog {
    pub id: LogId,
    pub device_id: DeviceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub status: WorkLogStatus,
    pub start_time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    /// Milliseconds between `start_time` and `end_time` for completed work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub user_agent: String,
}

impl WorkLog {
    /// Time used for ordering and age: `created_at`, else `start_time`.
    #[must_use]
    pub fn reference_time(&self) -> Timestamp {
        self.created_at.unwrap_or(self.start_time)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == WorkLogStatus::Error
    }

    /// Fill `execution_time` for completed work with both timestamps known.
    pub fn derive_execution_time(&mut self) {
        if self.status != WorkLogStatus::Completed || self.execution_time.is_some() {
            return;
        }
        if let Some(end_time) = self.end_time {
            self.execution_time = Some((end_time - self.start_time).num_milliseconds());
        }
    }

    /// Apply a field-level patch, re-deriving `execution_time` when possible.
    pub fn apply(&mut self, patch: WorkLogPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(task_id) = patch.task_id {
            self.task_id = Some(task_id);
        }
        if let Some(end_time) = patch.end_time {
            self.end_time = Some(end_time);
        }
        if let Some(execution_time) = patch.execution_time {
            self.execution_time = Some(execution_time);
        }
        if let Some(message) = patch.message {
            self.message = Some(message);
        }
        if let Some(data) = patch.data {
            self.data = data;
        }
        self.derive_execution_time();
    }
}

/// A work log as submitted by a device, before the store fills in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkLogDraft {
    #[serde(default)]
    pub id: Option<LogId>,
    pub device_id: DeviceId,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub status: WorkLogStatus,
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub execution_time: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub user_agent: String,
}

impl WorkLogDraft {
    /// Minimal draft for `device_id` in `status`.
    #[must_use]
    pub fn new(device_id: DeviceId, status: WorkLogStatus) -> Self {
        Self {
            id: None,
            device_id,
            task_id: None,
            status,
            start_time: None,
            end_time: None,
            created_at: None,
            execution_time: None,
            message: None,
            data: serde_json::Value::Null,
            client_ip: String::new(),
            user_agent: String::new(),
        }
    }

    /// Turn the draft into a stored log, assigning id and timestamps if absent.
    #[must_use]
    pub fn into_log(self, now: Timestamp) -> WorkLog {
        let mut log = WorkLog {
            id: self.id.unwrap_or_else(LogId::generate),
            device_id: self.device_id,
            task_id: self.task_id,
            status: self.status,
            start_time: self.start_time.unwrap_or(now),
            end_time: self.end_time,
            created_at: Some(self.created_at.unwrap_or(now)),
            execution_time: self.execution_time,
            message: self.message,
            data: self.data,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
        };
        log.derive_execution_time();
        log
    }
}

/// Explicit patch-by-id of an existing log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkLogPatch {
    pub status: Option<WorkLogStatus>,
    pub task_id: Option<TaskId>,
    pub end_time: Option<Timestamp>,
    pub execution_time: Option<i64>,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::time::now;

    fn draft(status: WorkLogStatus) -> WorkLogDraft {
        WorkLogDraft::new(DeviceId::new("pump-1").unwrap(), status)
    }

    #[test]
    fn should_assign_id_and_created_at_when_absent() {
        let ts = now();
        let log = draft(WorkLogStatus::Running).into_log(ts);
        assert!(!log.id.is_blank());
        assert_eq!(log.created_at, Some(ts));
        assert_eq!(log.start_time, ts);
    }

    #[test]
    fn should_keep_provided_id() {
        let mut d = draft(WorkLogStatus::Running);
        d.id = Some(LogId::new("log-7").unwrap());
        assert_eq!(d.into_log(now()).id.as_str(), "log-7");
    }

    #[test]
    fn should_compute_execution_time_for_completed_work() {
        let start = now();
        let mut d = draft(WorkLogStatus::Completed);
        d.start_time = Some(start);
        d.end_time = Some(start + Duration::milliseconds(1500));
        assert_eq!(d.into_log(now()).execution_time, Some(1500));
    }

    #[test]
    fn should_not_override_reported_execution_time() {
        let start = now();
        let mut d = draft(WorkLogStatus::Completed);
        d.start_time = Some(start);
        d.end_time = Some(start + Duration::seconds(2));
        d.execution_time = Some(42);
        assert_eq!(d.into_log(now()).execution_time, Some(42));
    }

    #[test]
    fn should_not_compute_execution_time_for_unfinished_work() {
        let start = now();
        let mut d = draft(WorkLogStatus::Running);
        d.start_time = Some(start);
        d.end_time = Some(start + Duration::seconds(2));
        assert_eq!(d.into_log(now()).execution_time, None);
    }

    #[test]
    fn should_derive_execution_time_when_patch_completes_the_log() {
        let start = now();
        let mut log = draft(WorkLogStatus::Running).into_log(start);
        log.apply(WorkLogPatch {
            status: Some(WorkLogStatus::Completed),
            end_time: Some(start + Duration::seconds(3)),
            ..WorkLogPatch::default()
        });
        assert_eq!(log.execution_time, Some(3000));
    }

    #[test]
    fn should_fall_back_to_start_time_for_reference_time() {
        let mut log = draft(WorkLogStatus::Running).into_log(now());
        log.created_at = None;
        assert_eq!(log.reference_time(), log.start_time);
    }

    #[test]
    fn should_parse_status_names() {
        assert_eq!(
            "error".parse::<WorkLogStatus>().unwrap(),
            WorkLogStatus::Error
        );
        assert!("exploded".parse::<WorkLogStatus>().is_err());
    }
}
