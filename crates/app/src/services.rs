//! Application services: use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod execution_coordinator;
pub mod log_store;
pub mod process_registry;
pub mod task_service;
pub mod telemetry;

mod ledger;
