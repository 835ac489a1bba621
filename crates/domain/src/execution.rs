//! Process execution: one run of an automation process.
//!
//! State machine per process: `Idle → Running → {Completed | Stopped | Error}`.
//! Idle is implicit (no running execution). Terminal executions are never
//! mutated again.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{NotFoundError, TankHubError, ValidationError};
use crate::id::{ExecutionId, ProcessId};
use crate::time::Timestamp;

/// Message recorded when an operator stops an execution.
pub const STOPPED_BY_USER: &str = "stopped by user";

/// Message recorded when the reaper gives up on a silent execution.
pub const HEARTBEAT_TIMEOUT: &str = "heartbeat timeout";

/// Lifecycle status of a [`ProcessExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Stopped,
    Completed,
    Error,
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
            Self::Completed => f.write_str("completed"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Outcome of one step as reported by the dispatch side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, alias = "result")]
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl Default for StepReport {
    fn default() -> Self {
        Self {
            success: true,
            output: serde_json::Value::Null,
            message: None,
        }
    }
}

/// A step result stored on the execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub task_index: usize,
    pub success: bool,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub recorded_at: Timestamp,
}

/// Bookkeeping record of one run of an automation process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExecution {
    pub id: ExecutionId,
    pub process_id: ProcessId,
    pub status: ExecutionStatus,
    pub start_time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,
    pub current_task_index: usize,
    /// Number of tasks the process had when this run started.
    pub task_count: usize,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_heartbeat: Timestamp,
}

/// What a recorded step did to the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More steps remain.
    Advanced,
    /// The final step finished; the execution is now `completed`.
    Completed,
    /// The step failed and the process does not continue on error.
    Failed,
}

impl ProcessExecution {
    /// A fresh `running` execution positioned on the first task.
    #[must_use]
    pub fn start(
        process_id: ProcessId,
        task_count: usize,
        continue_on_error: bool,
        now: Timestamp,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            process_id,
            status: ExecutionStatus::Running,
            start_time: now,
            end_time: None,
            current_task_index: 0,
            task_count,
            continue_on_error,
            results: Vec::new(),
            error: None,
            last_heartbeat: now,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// Guard used before every transition.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] when the execution is no longer
    /// running, so late or duplicate signals look like a missing execution.
    pub fn ensure_running(&self) -> Result<(), TankHubError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(NotFoundError {
                entity: "Running execution",
                id: self.id.to_string(),
            }
            .into())
        }
    }

    /// Record the completion of step `task_index`.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the execution is not running, or
    /// [`TankHubError::Validation`] if `task_index` is past the last task.
    pub fn record_step(
        &mut self,
        task_index: usize,
        report: StepReport,
        now: Timestamp,
    ) -> Result<StepOutcome, TankHubError> {
        self.ensure_running()?;
        if task_index >= self.task_count {
            return Err(ValidationError::TaskIndexOutOfBounds {
                index: task_index,
                count: self.task_count,
            }
            .into());
        }

        let success = report.success;
        let message = report.message.clone();
        self.results.push(StepResult {
            task_index,
            success,
            output: report.output,
            message: report.message,
            recorded_at: now,
        });
        self.current_task_index = task_index;
        self.last_heartbeat = now;

        if !success && !self.continue_on_error {
            self.finish(
                ExecutionStatus::Error,
                Some(message.unwrap_or_else(|| format!("task {task_index} failed"))),
                now,
            );
            return Ok(StepOutcome::Failed);
        }
        if task_index + 1 == self.task_count {
            self.finish(ExecutionStatus::Completed, None, now);
            return Ok(StepOutcome::Completed);
        }
        Ok(StepOutcome::Advanced)
    }

    /// Move a running execution into a terminal state.
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>, now: Timestamp) {
        self.status = status;
        self.end_time = Some(now);
        self.error = error;
    }

    /// Refresh the liveness timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the execution is not running.
    pub fn beat(&mut self, now: Timestamp) -> Result<(), TankHubError> {
        self.ensure_running()?;
        self.last_heartbeat = now;
        Ok(())
    }

    /// Whether a running execution has been silent for longer than `grace`.
    #[must_use]
    pub fn is_stale(&self, now: Timestamp, grace: Duration) -> bool {
        self.is_running() && now - self.last_heartbeat > grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now;

    fn running(task_count: usize) -> ProcessExecution {
        ProcessExecution::start(ProcessId::new(), task_count, false, now())
    }

    #[test]
    fn should_start_in_running_state_on_first_task() {
        let exec = running(3);
        assert!(exec.is_running());
        assert_eq!(exec.current_task_index, 0);
        assert!(exec.results.is_empty());
        assert!(exec.end_time.is_none());
        assert_eq!(exec.last_heartbeat, exec.start_time);
    }

    #[test]
    fn should_advance_then_complete_on_final_task() {
        let mut exec = running(2);
        let outcome = exec.record_step(0, StepReport::default(), now()).unwrap();
        assert_eq!(outcome, StepOutcome::Advanced);
        assert!(exec.is_running());

        let outcome = exec.record_step(1, StepReport::default(), now()).unwrap();
        assert_eq!(outcome, StepOutcome::Completed);
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.current_task_index, 1);
        assert_eq!(exec.results.len(), 2);
        assert!(exec.end_time.is_some());
    }

    #[test]
    fn should_reject_steps_after_terminal_transition() {
        let mut exec = running(1);
        exec.finish(ExecutionStatus::Stopped, Some(STOPPED_BY_USER.into()), now());
        let result = exec.record_step(0, StepReport::default(), now());
        assert!(matches!(result, Err(TankHubError::NotFound(_))));
    }

    #[test]
    fn should_reject_out_of_bounds_task_index() {
        let mut exec = running(2);
        let result = exec.record_step(2, StepReport::default(), now());
        assert!(matches!(
            result,
            Err(TankHubError::Validation(
                ValidationError::TaskIndexOutOfBounds { index: 2, count: 2 }
            ))
        ));
        assert!(exec.results.is_empty());
    }

    #[test]
    fn should_fail_on_unsuccessful_step_unless_continuing_on_error() {
        let failing = StepReport {
            success: false,
            message: Some("pump jammed".to_string()),
            ..StepReport::default()
        };

        let mut strict = running(3);
        assert_eq!(
            strict.record_step(0, failing.clone(), now()).unwrap(),
            StepOutcome::Failed
        );
        assert_eq!(strict.status, ExecutionStatus::Error);
        assert_eq!(strict.error.as_deref(), Some("pump jammed"));

        let mut lenient = ProcessExecution::start(ProcessId::new(), 3, true, now());
        assert_eq!(
            lenient.record_step(0, failing, now()).unwrap(),
            StepOutcome::Advanced
        );
        assert!(lenient.is_running());
    }

    #[test]
    fn should_detect_stale_running_executions_only() {
        let t0 = now();
        let mut exec = ProcessExecution::start(ProcessId::new(), 1, false, t0);
        let later = t0 + Duration::minutes(10);
        assert!(exec.is_stale(later, Duration::minutes(5)));
        assert!(!exec.is_stale(later, Duration::minutes(15)));

        exec.finish(ExecutionStatus::Completed, None, later);
        assert!(!exec.is_stale(later + Duration::hours(1), Duration::minutes(5)));
    }

    #[test]
    fn should_serialize_status_in_lowercase() {
        let json = serde_json::to_value(running(1)).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["currentTaskIndex"], 0);
    }
}
