//! Key-value store port: the only persistence primitive the core relies on.
//!
//! Values are opaque JSON strings. Keys are namespaced with `:` separators
//! (`task:current:{id}`, `process:{id}`, ...) so a prefix scan lists one
//! namespace.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tankhub_domain::error::TankHubError;

/// A string key-value store with prefix scans, an atomic create-if-absent
/// and a compare-and-delete.
///
/// Implementations must make a completed `set` visible to every later `get`
/// or `scan_prefix`.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, TankHubError>> + Send;

    /// Write `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String)
    -> impl Future<Output = Result<(), TankHubError>> + Send;

    /// Remove `key`. Returns whether something was removed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, TankHubError>> + Send;

    /// Atomically remove `key` only while it still holds `expected`.
    ///
    /// Returns `false` when the key is missing, expired, or holds another value.
    fn delete_if_value(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = Result<bool, TankHubError>> + Send;

    /// All entries whose key starts with `prefix`, ordered by key.
    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<(String, String)>, TankHubError>> + Send;

    /// Atomically write `value` only if `key` holds no live value.
    ///
    /// When `ttl` is set the entry disappears on its own after that long.
    /// Returns `true` when this call created the entry.
    fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<bool, TankHubError>> + Send;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, TankHubError>> + Send {
        (**self).get(key)
    }

    fn set(
        &self,
        key: &str,
        value: String,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        (**self).delete(key)
    }

    fn delete_if_value(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        (**self).delete_if_value(key, expected)
    }

    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<(String, String)>, TankHubError>> + Send {
        (**self).scan_prefix(prefix)
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        (**self).set_if_absent(key, value, ttl)
    }
}
