//! # tankhub-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `KeyValueStore`: string key-value persistence with prefix scans and
//!     create-if-absent
//!   - `TaskDispatcher`: forwards execution start/stop commands to devices
//! - Define **driving/inbound ports** as use-case structs:
//!   - `TaskService`: versioned task CRUD with last-write-wins
//!   - `ProcessRegistry`: automation processes with referential checks
//!   - `ExecutionCoordinator`: single-flight execution bookkeeping
//!   - `LogStore`: work logs and their retention policy
//! - Provide **in-process infrastructure** that doesn't need IO: the
//!   in-memory store, the retry/timeout decorator and the background jobs
//!
//! ## Dependency rule
//! Depends on `tankhub-domain` only (plus `tokio` for timers and tasks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod collection;
pub mod jobs;
pub mod memory_store;
pub mod ports;
pub mod resilient_store;
pub mod services;
pub mod versioned_store;
