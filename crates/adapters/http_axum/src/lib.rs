//! # tankhub-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve the **JSON API** for tasks, processes, executions and work logs
//!   under `/api`
//! - Authenticate callers with a static token table and enforce role checks
//! - Map HTTP requests into application service calls (driving adapter)
//! - Wrap results in the `{success, data}` / `{success, error}` envelope
//!
//! ## Dependency rule
//! Depends on `tankhub-app` (for port traits and services) and `tankhub-domain`
//! (for domain types used in request/response mapping). Never leaks axum types
//! into the domain.

pub mod api;
pub mod auth;
pub mod error;
pub mod router;
pub mod state;
