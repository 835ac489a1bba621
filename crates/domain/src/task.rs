//! Task: a single device command definition, edited concurrently by operators.
//!
//! Tasks are versioned: every save is archived (see [`crate::version`]) and
//! the snapshot with the newest `updated_at` is authoritative.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{TankHubError, ValidationError};
use crate::id::{DeviceId, TaskId};
use crate::time::Timestamp;
use crate::version::Versioned;

/// A device command definition referenced by automation processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    /// Command verb sent to the device (e.g. `open_valve`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub updated_at: Timestamp,
}

impl Task {
    /// Create a builder for constructing a [`Task`].
    #[must_use]
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] when:
    /// - `id` is blank ([`ValidationError::EmptyId`])
    /// - `name` is blank ([`ValidationError::EmptyName`])
    pub fn validate(&self) -> Result<(), TankHubError> {
        if self.id.is_blank() {
            return Err(ValidationError::EmptyId.into());
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }

    /// Produce a new snapshot with `patch` applied and stamped at `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if the patched task breaks an invariant.
    pub fn patched(&self, patch: TaskPatch, updated_at: Timestamp) -> Result<Self, TankHubError> {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(description) = patch.description {
            next.description = Some(description);
        }
        if let Some(device_id) = patch.device_id {
            next.device_id = Some(device_id);
        }
        if let Some(action) = patch.action {
            next.action = Some(action);
        }
        if let Some(parameters) = patch.parameters {
            next.parameters = parameters;
        }
        if let Some(timeout_secs) = patch.timeout_secs {
            next.timeout_secs = Some(timeout_secs);
        }
        next.updated_at = updated_at;
        next.validate()?;
        Ok(next)
    }
}

impl Versioned for Task {
    const ENTITY: &'static str = "Task";

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn set_updated_at(&mut self, updated_at: Timestamp) {
        self.updated_at = updated_at;
    }
}

/// Field-level partial update of a [`Task`]. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub device_id: Option<DeviceId>,
    pub action: Option<String>,
    pub parameters: Option<BTreeMap<String, serde_json::Value>>,
    pub timeout_secs: Option<u64>,
}

/// Step-by-step builder for [`Task`].
#[derive(Debug, Default)]
pub struct TaskBuilder {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    device_id: Option<DeviceId>,
    action: Option<String>,
    parameters: BTreeMap<String, serde_json::Value>,
    timeout_secs: Option<u64>,
    updated_at: Option<Timestamp>,
}

impl TaskBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
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
    pub fn device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    #[must_use]
    pub fn updated_at(mut self, updated_at: Timestamp) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Consume the builder, validate, and return a [`Task`].
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if `id` or `name` is missing or blank.
    pub fn build(self) -> Result<Task, TankHubError> {
        let task = Task {
            id: TaskId::new(self.id.unwrap_or_default())?,
            name: self.name.unwrap_or_default(),
            description: self.description,
            device_id: self.device_id,
            action: self.action,
            parameters: self.parameters,
            timeout_secs: self.timeout_secs,
            updated_at: self.updated_at.unwrap_or_else(crate::time::now),
        };
        task.validate()?;
        Ok(task)
    }
}
