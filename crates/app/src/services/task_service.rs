//! Task service: versioned CRUD for device command definitions.

use tankhub_domain::error::{NotFoundError, TankHubError};
use tankhub_domain::id::TaskId;
use tankhub_domain::task::{Task, TaskPatch};
use tankhub_domain::time;
use tankhub_domain::version::RecordVersion;

use crate::ports::KeyValueStore;
use crate::versioned_store::{PutOutcome, VersionedStore};

/// Namespace tasks are stored under.
pub const TASK_NAMESPACE: &str = "task";

/// Application service for tasks, backed by a [`VersionedStore`].
pub struct TaskService<S> {
    records: VersionedStore<S, Task>,
}

impl<S: KeyValueStore + Clone> TaskService<S> {
    /// Create a new service on top of the given store.
    pub fn new(store: S) -> Self {
        Self {
            records: VersionedStore::new(store, TASK_NAMESPACE),
        }
    }

    /// Offer a full task snapshot. Last write (by `updated_at`) wins.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if the id or name is blank, or a
    /// storage error.
    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn save(&self, task: Task) -> Result<PutOutcome<Task>, TankHubError> {
        task.validate()?;
        let outcome = self.records.put(task).await?;
        tracing::debug!(
            version = outcome.version,
            accepted = outcome.accepted,
            "task saved"
        );
        Ok(outcome)
    }

    /// Apply a field-level patch to the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the task does not exist,
    /// [`TankHubError::Validation`] if the result is invalid, or a storage error.
    #[tracing::instrument(skip(self, patch))]
    pub async fn patch(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> Result<PutOutcome<Task>, TankHubError> {
        let current = self.get_task(id).await?;
        // Never stamp a patch before the snapshot it was derived from.
        let stamp = time::now().max(current.updated_at);
        let next = current.patched(patch, stamp)?;
        self.records.put(next).await
    }

    /// Current snapshot of a task.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] when no task with `id` exists, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, id: &TaskId) -> Result<Task, TankHubError> {
        self.find_task(id).await?.ok_or_else(|| not_found(id))
    }

    /// Current snapshot of a task, `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    pub async fn find_task(&self, id: &TaskId) -> Result<Option<Task>, TankHubError> {
        Ok(self.records.get(id.as_str()).await?.map(|v| v.snapshot))
    }

    /// All current tasks ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, TankHubError> {
        Ok(self
            .records
            .list()
            .await?
            .into_iter()
            .map(|v| v.snapshot)
            .collect())
    }

    /// Version history of a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] when the task was never saved, or a
    /// storage error.
    pub async fn history(&self, id: &TaskId) -> Result<Vec<RecordVersion<Task>>, TankHubError> {
        let history = self.records.history(id.as_str()).await?;
        if history.is_empty() {
            return Err(not_found(id));
        }
        Ok(history)
    }

    /// Make an archived version current again.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the task or version is missing, or
    /// a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn restore(
        &self,
        id: &TaskId,
        version: u64,
    ) -> Result<RecordVersion<Task>, TankHubError> {
        let restored = self.records.restore(id.as_str(), version).await?;
        tracing::info!(new_version = restored.version, "task restored");
        Ok(restored)
    }

    /// Delete every task and its history.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<usize, TankHubError> {
        let removed = self.records.clear_all().await?;
        tracing::warn!(removed, "all tasks cleared");
        Ok(removed)
    }
}

fn not_found(id: &TaskId) -> TankHubError {
    NotFoundError {
        entity: "Task",
        id: id.to_string(),
    }
    .into()
}
