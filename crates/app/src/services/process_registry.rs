//! Automation process registry: CRUD with referential checks.
//!
//! Task references are validated when a process is created or its task list
//! is replaced. Later task deletions are tolerated and show up as dangling
//! entries when the process is read.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tankhub_domain::error::{ConflictError, DanglingReferenceError, NotFoundError, TankHubError};
use tankhub_domain::id::{ExecutionId, ProcessId, TaskId};
use tankhub_domain::process::{AutomationProcess, ProcessConfig, ProcessPatch};
use tankhub_domain::task::Task;
use tankhub_domain::time;

use crate::collection::Collection;
use crate::ports::KeyValueStore;
use crate::services::ledger::ExecutionLedger;
use crate::services::task_service::TASK_NAMESPACE;
use crate::versioned_store::VersionedStore;

/// Namespace processes are stored under.
pub const PROCESS_NAMESPACE: &str = "process";

/// Input of [`ProcessRegistry::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProcess {
    pub name: String,
    pub task_ids: Vec<TaskId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<ProcessConfig>,
}

/// A process annotated with its resolved tasks and run state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessView {
    #[serde(flatten)]
    pub process: AutomationProcess,
    /// Tasks in process order. `None` marks a reference that no longer resolves.
    pub tasks: Vec<Option<Task>>,
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_execution_id: Option<ExecutionId>,
}

/// Application service for automation processes.
pub struct ProcessRegistry<S> {
    processes: Collection<S, AutomationProcess>,
    tasks: VersionedStore<S, Task>,
    ledger: ExecutionLedger<S>,
}

impl<S: KeyValueStore + Clone> ProcessRegistry<S> {
    /// Create a new registry on top of the given store.
    pub fn new(store: S) -> Self {
        Self {
            processes: Collection::new(store.clone(), PROCESS_NAMESPACE),
            tasks: VersionedStore::new(store.clone(), TASK_NAMESPACE),
            ledger: ExecutionLedger::new(store),
        }
    }

    /// Register a new process. Nothing is stored when a check fails.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if the name or task list is empty,
    /// [`TankHubError::DanglingReference`] if a task id does not resolve, or a
    /// storage error.
    #[tracing::instrument(skip(self, input), fields(process_name = %input.name))]
    pub async fn create(&self, input: NewProcess) -> Result<AutomationProcess, TankHubError> {
        let mut builder = AutomationProcess::builder()
            .name(input.name)
            .task_ids(input.task_ids)
            .config(input.config.unwrap_or_default());
        if let Some(description) = input.description {
            builder = builder.description(description);
        }
        let process = builder.build()?;

        self.check_references(&process.task_ids).await?;
        self.processes
            .put(&process.id.to_string(), &process)
            .await?;
        tracing::info!(process_id = %process.id, tasks = process.task_count(), "process created");
        Ok(process)
    }

    /// Apply a partial update to a process that is not running.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the process does not exist,
    /// [`TankHubError::Conflict`] while it runs, [`TankHubError::Validation`] or
    /// [`TankHubError::DanglingReference`] for a bad patch, or a storage error.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: ProcessId,
        patch: ProcessPatch,
    ) -> Result<AutomationProcess, TankHubError> {
        let current = self.fetch(id).await?;
        self.ensure_not_running(id).await?;

        let touches_tasks = patch.touches_tasks();
        let next = current.patched(patch, time::now().max(current.updated_at))?;
        if touches_tasks {
            self.check_references(&next.task_ids).await?;
        }
        self.processes.put(&id.to_string(), &next).await?;
        Ok(next)
    }

    /// Remove a process that is not running.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the process does not exist,
    /// [`TankHubError::Conflict`] while it runs, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ProcessId) -> Result<(), TankHubError> {
        self.fetch(id).await?;
        self.ensure_not_running(id).await?;
        self.processes.delete(&id.to_string()).await?;
        tracing::info!("process deleted");
        Ok(())
    }

    /// One process with its tasks in order, dangling references as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the process does not exist, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ProcessId) -> Result<ProcessView, TankHubError> {
        let process = self.fetch(id).await?;
        let mut tasks = Vec::with_capacity(process.task_count());
        for task_id in &process.task_ids {
            tasks.push(self.tasks.get(task_id.as_str()).await?.map(|v| v.snapshot));
        }
        let running = self.ledger.find_running(id).await?.map(|e| e.id);
        Ok(ProcessView {
            process,
            tasks,
            is_running: running.is_some(),
            running_execution_id: running,
        })
    }

    /// Up to `limit` processes, newest first, with dangling tasks filtered out.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, limit: usize) -> Result<Vec<ProcessView>, TankHubError> {
        let mut processes = self.processes.all().await?;
        processes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        processes.truncate(limit);

        let tasks: HashMap<TaskId, Task> = self
            .tasks
            .list()
            .await?
            .into_iter()
            .map(|v| (v.snapshot.id.clone(), v.snapshot))
            .collect();
        let running = self.ledger.running_by_process().await?;

        Ok(processes
            .into_iter()
            .map(|process| {
                let resolved = process
                    .task_ids
                    .iter()
                    .filter_map(|id| tasks.get(id).cloned())
                    .map(Some)
                    .collect();
                let running_execution_id = running.get(&process.id).copied();
                ProcessView {
                    process,
                    tasks: resolved,
                    is_running: running_execution_id.is_some(),
                    running_execution_id,
                }
            })
            .collect())
    }

    async fn fetch(&self, id: ProcessId) -> Result<AutomationProcess, TankHubError> {
        self.processes
            .get(&id.to_string())
            .await?
            .ok_or_else(|| {
                NotFoundError {
                    entity: "Process",
                    id: id.to_string(),
                }
                .into()
            })
    }

    async fn ensure_not_running(&self, id: ProcessId) -> Result<(), TankHubError> {
        match self.ledger.find_running(id).await? {
            Some(execution) => Err(ConflictError::ProcessRunning {
                process_id: id,
                execution_id: execution.id,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// One lookup per id. A task deleted right after its check is accepted.
    async fn check_references(&self, task_ids: &[TaskId]) -> Result<(), TankHubError> {
        for task_id in task_ids {
            if self.tasks.get(task_id.as_str()).await?.is_none() {
                return Err(DanglingReferenceError {
                    entity: "Process",
                    referenced: "Task",
                    id: task_id.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use tankhub_domain::error::ErrorKind;
    use tankhub_domain::execution::{ExecutionStatus, ProcessExecution};

    use super::*;
    use crate::memory_store::InMemoryStore;
    use crate::services::task_service::TaskService;

    struct Fixture {
        store: Arc<InMemoryStore>,
        tasks: TaskService<Arc<InMemoryStore>>,
        registry: ProcessRegistry<Arc<InMemoryStore>>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        Fixture {
            tasks: TaskService::new(Arc::clone(&store)),
            registry: ProcessRegistry::new(Arc::clone(&store)),
            store,
        }
    }

    async fn seed_task(fx: &Fixture, id: &str) -> TaskId {
        let task = Task::builder().id(id).name(id).build().unwrap();
        fx.tasks.save(task).await.unwrap();
        TaskId::new(id).unwrap()
    }

    fn new_process(name: &str, task_ids: Vec<TaskId>) -> NewProcess {
        NewProcess {
            name: name.to_string(),
            task_ids,
            description: None,
            config: None,
        }
    }

    async fn mark_running(fx: &Fixture, process_id: ProcessId) -> ProcessExecution {
        let execution = ProcessExecution::start(process_id, 1, false, time::now());
        let ledger = ExecutionLedger::new(Arc::clone(&fx.store));
        ledger.save(&execution).await.unwrap();
        execution
    }

    #[tokio::test]
    async fn should_create_process_when_tasks_resolve() {
        let fx = fixture();
        let fill = seed_task(&fx, "fill").await;
        let process = fx
            .registry
            .create(new_process("Morning", vec![fill]))
            .await
            .unwrap();

        let view = fx.registry.get(process.id).await.unwrap();
        assert_eq!(view.process.name, "Morning");
        assert_eq!(view.tasks.len(), 1);
        assert!(!view.is_running);
    }

    #[tokio::test]
    async fn should_reject_dangling_reference_and_store_nothing() {
        let fx = fixture();
        let err = fx
            .registry
            .create(new_process("Broken", vec![TaskId::new("missing-id").unwrap()]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DanglingReference);
        assert!(fx.registry.list(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reject_empty_name_or_task_list() {
        let fx = fixture();
        let fill = seed_task(&fx, "fill").await;
        let err = fx
            .registry
            .create(new_process(" ", vec![fill]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = fx
            .registry
            .create(new_process("Empty", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn should_conflict_on_update_and_delete_while_running() {
        let fx = fixture();
        let fill = seed_task(&fx, "fill").await;
        let process = fx
            .registry
            .create(new_process("Morning", vec![fill]))
            .await
            .unwrap();
        let mut execution = mark_running(&fx, process.id).await;

        let patch = ProcessPatch {
            name: Some("Evening".to_string()),
            ..ProcessPatch::default()
        };
        let err = fx
            .registry
            .update(process.id, patch.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = fx.registry.delete(process.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        execution.finish(ExecutionStatus::Completed, None, time::now());
        ExecutionLedger::new(Arc::clone(&fx.store))
            .save(&execution)
            .await
            .unwrap();

        let updated = fx.registry.update(process.id, patch).await.unwrap();
        assert_eq!(updated.name, "Evening");
        fx.registry.delete(process.id).await.unwrap();
    }

    #[tokio::test]
    async fn should_revalidate_patched_task_list() {
        let fx = fixture();
        let fill = seed_task(&fx, "fill").await;
        let process = fx
            .registry
            .create(new_process("Morning", vec![fill]))
            .await
            .unwrap();

        let err = fx
            .registry
            .update(
                process.id,
                ProcessPatch {
                    task_ids: Some(vec![TaskId::new("ghost").unwrap()]),
                    ..ProcessPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DanglingReference);

        let err = fx
            .registry
            .update(
                process.id,
                ProcessPatch {
                    task_ids: Some(vec![]),
                    ..ProcessPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_process() {
        let fx = fixture();
        let id = ProcessId::new();
        assert_eq!(
            fx.registry.get(id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            fx.registry.delete(id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            fx.registry
                .update(id, ProcessPatch::default())
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn should_surface_deleted_tasks_as_null_in_get_and_drop_them_in_list() {
        let fx = fixture();
        let fill = seed_task(&fx, "fill").await;
        let drain = seed_task(&fx, "drain").await;
        let process = fx
            .registry
            .create(new_process("Cycle", vec![fill, drain]))
            .await
            .unwrap();
        fx.tasks.clear_all().await.unwrap();
        seed_task(&fx, "drain").await;

        let view = fx.registry.get(process.id).await.unwrap();
        assert_eq!(view.tasks.len(), 2);
        assert!(view.tasks[0].is_none());
        assert!(view.tasks[1].is_some());

        let listed = fx.registry.list(10).await.unwrap();
        assert_eq!(listed[0].tasks.len(), 1);
    }

    #[tokio::test]
    async fn should_list_newest_first_up_to_limit_with_running_flag() {
        let fx = fixture();
        let fill = seed_task(&fx, "fill").await;
        let t0 = time::now();
        let mut ids = Vec::new();
        for (i, name) in ["old", "mid", "new"].into_iter().enumerate() {
            let process = AutomationProcess::builder()
                .name(name)
                .task_id(fill.clone())
                .created_at(t0 + Duration::seconds(i64::try_from(i).unwrap()))
                .build()
                .unwrap();
            fx.registry
                .processes
                .put(&process.id.to_string(), &process)
                .await
                .unwrap();
            ids.push(process.id);
        }
        mark_running(&fx, ids[2]).await;

        let listed = fx.registry.list(2).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|v| v.process.name.as_str()).collect();
        assert_eq!(names, vec!["new", "mid"]);
        assert!(listed[0].is_running);
        assert!(!listed[1].is_running);
    }

    #[tokio::test]
    async fn should_serialize_view_flat_with_running_flag() {
        let fx = fixture();
        let fill = seed_task(&fx, "fill").await;
        let process = fx
            .registry
            .create(new_process("Morning", vec![fill]))
            .await
            .unwrap();
        let json = serde_json::to_value(fx.registry.get(process.id).await.unwrap()).unwrap();
        assert_eq!(json["name"], "Morning");
        assert_eq!(json["isRunning"], false);
        assert!(json["taskIds"].is_array());
        assert!(json.get("runningExecutionId").is_none());
    }
}
