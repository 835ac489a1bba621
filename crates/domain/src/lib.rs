//! # tankhub-domain
//!
//! Pure domain model for the tankhub tank/pump/valve monitoring backend.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps, roles
//! - Define **Tasks** (device commands edited concurrently by operators) and
//!   their immutable **versions**
//! - Define **Automation processes** (ordered task sequences)
//! - Define **Process executions** and their lifecycle state machine
//! - Define **Work logs** reported by devices and the **retention policy**
//!   that bounds them, including the eviction algorithm
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod role;
pub mod time;

pub mod execution;
pub mod process;
pub mod retention;
pub mod task;
pub mod version;
pub mod work_log;
