//! # tankhubd: tankhub daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Wrap the key-value store with timeouts and retries
//! - Construct application services on top of the store
//! - Connect the MQTT dispatcher and telemetry bridge when enabled
//! - Start the retention scheduler and the stale-execution reaper
//! - Build the axum router, bind to a TCP port and serve
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tankhub_adapter_http_axum::auth::TokenTable;
use tankhub_adapter_http_axum::state::AppState;
use tankhub_adapter_mqtt::MqttBridge;
use tankhub_adapter_storage_sqlite_sqlx::Config as DatabaseConfig;
use tankhub_app::jobs;
use tankhub_app::ports::{KeyValueStore, NoopDispatcher, TaskDispatcher};
use tankhub_app::resilient_store::ResilientStore;
use tankhub_app::services::execution_coordinator::ExecutionCoordinator;
use tankhub_app::services::log_store::LogStore;
use tankhub_app::services::process_registry::ProcessRegistry;
use tankhub_app::services::task_service::TaskService;
use tankhub_app::services::telemetry::ServiceTelemetry;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_new(&config.logging.filter).context("invalid logging filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Database
    let db = DatabaseConfig {
        database_url: config.database_url().to_string(),
        max_connections: config.database.max_connections,
    }
    .build()
    .await
    .context("failed to open database")?;
    let store = ResilientStore::new(db.key_value_store(), config.retry_policy());

    if config.mqtt.enabled {
        let (dispatcher, bridge) = tankhub_adapter_mqtt::connect(&config.mqtt);
        tracing::info!(
            broker = %config.mqtt.broker_host,
            port = config.mqtt.broker_port,
            base_topic = %config.mqtt.base_topic,
            "MQTT integration enabled"
        );
        run(config, store, dispatcher, Some(bridge)).await
    } else {
        tracing::info!("MQTT integration disabled, executions are not dispatched");
        run(config, store, NoopDispatcher, None).await
    }
}

async fn run<S, D>(
    config: Config,
    store: S,
    dispatcher: D,
    bridge: Option<MqttBridge>,
) -> anyhow::Result<()>
where
    S: KeyValueStore + Clone + 'static,
    D: TaskDispatcher + 'static,
{
    // Services
    let task_service = Arc::new(TaskService::new(store.clone()));
    let process_registry = Arc::new(ProcessRegistry::new(store.clone()));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        store.clone(),
        dispatcher,
        config.coordinator_settings(),
    ));
    let log_store = Arc::new(LogStore::new(store));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    // Device transport
    if let Some(bridge) = bridge {
        let sink = ServiceTelemetry::new(Arc::clone(&log_store), Arc::clone(&coordinator));
        background.push(bridge.start(sink, shutdown_rx.clone()));
    }

    // Background jobs
    background.push(jobs::spawn_retention_scheduler(
        Arc::clone(&log_store),
        Duration::from_secs(config.retention.scheduler_interval_secs),
        shutdown_rx.clone(),
    ));
    if let Some(grace) = config.stale_after() {
        background.push(jobs::spawn_stale_reaper(
            Arc::clone(&coordinator),
            grace,
            Duration::from_secs(config.coordinator.reaper_interval_secs),
            shutdown_rx.clone(),
        ));
    }

    // HTTP
    if config.auth.tokens.is_empty() {
        tracing::warn!("no API tokens configured, authentication is disabled");
    }
    let state = AppState::from_arcs(
        task_service,
        process_registry,
        coordinator,
        log_store,
        TokenTable::new(config.auth.tokens.clone()),
    );
    let app = tankhub_adapter_http_axum::router::build(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(%bind_addr, "tankhubd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("shutting down background tasks");
    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(err) = handle.await {
            tracing::warn!(%err, "background task ended abnormally");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
