//! Shared application state for axum handlers.

use std::sync::Arc;

use axum::extract::FromRef;
use tankhub_app::ports::{KeyValueStore, TaskDispatcher};
use tankhub_app::services::execution_coordinator::ExecutionCoordinator;
use tankhub_app::services::log_store::LogStore;
use tankhub_app::services::process_registry::ProcessRegistry;
use tankhub_app::services::task_service::TaskService;

use crate::auth::TokenTable;

/// Application state shared across all axum handlers.
///
/// Generic over the backing store and the task dispatcher to avoid dynamic
/// dispatch. `Clone` is implemented manually so only the `Arc` wrappers are
/// cloned.
pub struct AppState<S, D> {
    /// Versioned task CRUD.
    pub task_service: Arc<TaskService<S>>,
    /// Automation process definitions.
    pub process_registry: Arc<ProcessRegistry<S>>,
    /// Start/stop/advance of executions.
    pub coordinator: Arc<ExecutionCoordinator<S, D>>,
    /// Work logs and retention.
    pub log_store: Arc<LogStore<S>>,
    /// Credentials accepted by the API.
    pub tokens: Arc<TokenTable>,
}

impl<S, D> Clone for AppState<S, D> {
    fn clone(&self) -> Self {
        Self {
            task_service: Arc::clone(&self.task_service),
            process_registry: Arc::clone(&self.process_registry),
            coordinator: Arc::clone(&self.coordinator),
            log_store: Arc::clone(&self.log_store),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<S, D> FromRef<AppState<S, D>> for Arc<TokenTable> {
    fn from_ref(state: &AppState<S, D>) -> Self {
        Arc::clone(&state.tokens)
    }
}

impl<S, D> AppState<S, D>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    /// Build every service on top of one store.
    pub fn new(store: S, coordinator: ExecutionCoordinator<S, D>, tokens: TokenTable) -> Self {
        Self::from_arcs(
            Arc::new(TaskService::new(store.clone())),
            Arc::new(ProcessRegistry::new(store.clone())),
            Arc::new(coordinator),
            Arc::new(LogStore::new(store)),
            tokens,
        )
    }

    /// Create a new application state from pre-wrapped `Arc` services.
    ///
    /// Use this when services need to be shared with background tasks
    /// before constructing the HTTP state.
    pub fn from_arcs(
        task_service: Arc<TaskService<S>>,
        process_registry: Arc<ProcessRegistry<S>>,
        coordinator: Arc<ExecutionCoordinator<S, D>>,
        log_store: Arc<LogStore<S>>,
        tokens: TokenTable,
    ) -> Self {
        Self {
            task_service,
            process_registry,
            coordinator,
            log_store,
            tokens: Arc::new(tokens),
        }
    }
}
