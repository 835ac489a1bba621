//! # tankhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `KeyValueStore` port defined in `tankhub-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//!
//! ## Dependency rule
//! Depends on `tankhub-app` (for port traits) and `tankhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod error;
mod kv_store;
mod pool;

pub use error::StorageError;
pub use kv_store::SqliteKeyValueStore;
pub use pool::{Config, Database};
