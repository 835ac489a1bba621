//! Automation process: an ordered sequence of tasks run as one unit.
//!
//! A process only *references* tasks by id. Whether those ids resolve is
//! checked when the process is created or updated, never enforced afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{TankHubError, ValidationError};
use crate::id::{ProcessId, TaskId};
use crate::time::Timestamp;

/// A named, ordered sequence of task references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationProcess {
    pub id: ProcessId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub task_ids: Vec<TaskId>,
    #[serde(default)]
    pub config: ProcessConfig,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Execution settings attached to a process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessConfig {
    /// Keep advancing when a device reports a failed step.
    pub continue_on_error: bool,
    pub step_timeout_secs: Option<u64>,
    /// Free-form settings forwarded to the dispatcher untouched.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AutomationProcess {
    /// Create a builder for constructing an [`AutomationProcess`].
    #[must_use]
    pub fn builder() -> AutomationProcessBuilder {
        AutomationProcessBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] when:
    /// - `name` is blank ([`ValidationError::EmptyName`])
    /// - `task_ids` is empty ([`ValidationError::NoTasks`])
    /// - one of the task ids is blank ([`ValidationError::EmptyId`])
    pub fn validate(&self) -> Result<(), TankHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.task_ids.is_empty() {
            return Err(ValidationError::NoTasks.into());
        }
        if self.task_ids.iter().any(TaskId::is_blank) {
            return Err(ValidationError::EmptyId.into());
        }
        Ok(())
    }

    /// Number of steps an execution of this process walks through.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.task_ids.len()
    }

    /// Produce a new definition with `patch` applied and stamped at `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if the patched process breaks an invariant.
    pub fn patched(
        &self,
        patch: ProcessPatch,
        updated_at: Timestamp,
    ) -> Result<Self, TankHubError> {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(task_ids) = patch.task_ids {
            next.task_ids = task_ids;
        }
        if let Some(config) = patch.config {
            next.config = config;
        }
        next.updated_at = updated_at;
        next.validate()?;
        Ok(next)
    }
}

/// Field-level partial update of an [`AutomationProcess`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub task_ids: Option<Vec<TaskId>>,
    pub config: Option<ProcessConfig>,
}

impl ProcessPatch {
    /// Whether the patch replaces the task sequence.
    #[must_use]
    pub fn touches_tasks(&self) -> bool {
        self.task_ids.is_some()
    }
}

/// Step-by-step builder for [`AutomationProcess`].
#[derive(Debug, Default)]
pub struct AutomationProcessBuilder {
    id: Option<ProcessId>,
    name: Option<String>,
    description: Option<String>,
    task_ids: Vec<TaskId>,
    config: Option<ProcessConfig>,
    created_at: Option<Timestamp>,
}

impl AutomationProcessBuilder {
    #[must_use]
    pub fn id(mut self, id: ProcessId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn task_id(mut self, task_id: TaskId) -> Self {
        self.task_ids.push(task_id);
        self
    }

    #[must_use]
    pub fn task_ids(mut self, task_ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.task_ids.extend(task_ids);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ProcessConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Consume the builder, validate, and return an [`AutomationProcess`].
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if required fields are missing or empty.
    pub fn build(self) -> Result<AutomationProcess, TankHubError> {
        let created_at = self.created_at.unwrap_or_else(crate::time::now);
        let process = AutomationProcess {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            task_ids: self.task_ids,
            config: self.config.unwrap_or_default(),
            created_at,
            updated_at: created_at,
        };
        process.validate()?;
        Ok(process)
    }
}
