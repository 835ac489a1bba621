//! `SQLite` implementation of [`KeyValueStore`].
//!
//! All entries live in one `kv_entries` table. Expired TTL entries are
//! filtered out on read and replaced in place by `set_if_absent`.

use std::time::Duration;

use sqlx::SqlitePool;

use tankhub_app::ports::KeyValueStore;
use tankhub_domain::error::TankHubError;

use crate::error::StorageError;

/// `SQLite`-backed key-value store.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn expiry_millis(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(ttl)
}

impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, TankHubError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM kv_entries WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), TankHubError> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at) VALUES (?, ?, NULL) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = NULL",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, TankHubError> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool, TankHubError> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE key = ? AND value = ? \
             AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(expected)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(result.rows_affected() == 1)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, TankHubError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM kv_entries \
             WHERE key >= ? AND substr(key, 1, length(?)) = ? \
             AND (expires_at IS NULL OR expires_at > ?) \
             ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix)
        .bind(prefix)
        .bind(now_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, TankHubError> {
        // The upsert only overwrites a row whose TTL already elapsed, so the
        // statement as a whole is the compare-and-set.
        let result = sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at \
             WHERE kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= ?",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(expiry_millis))
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use tankhub_app::services::task_service::TaskService;
    use tankhub_domain::id::TaskId;
    use tankhub_domain::task::Task;

    use super::*;
    use crate::pool::Config;

    async fn setup() -> SqliteKeyValueStore {
        Config {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
        .build()
        .await
        .unwrap()
        .key_value_store()
    }

    #[tokio::test]
    async fn should_overwrite_value_on_set() {
        let store = setup().await;
        store.set("process:a", "1".to_string()).await.unwrap();
        store.set("process:a", "2".to_string()).await.unwrap();
        assert_eq!(store.get("process:a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("process:b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_scan_prefix_in_key_order_without_neighbours() {
        let store = setup().await;
        for key in ["task:current:b", "task:current:a", "task:history:a", "task:currentx"] {
            store.set(key, "{}".to_string()).await.unwrap();
        }
        let keys: Vec<String> = store
            .scan_prefix("task:current:")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["task:current:a", "task:current:b"]);
    }

    #[tokio::test]
    async fn should_treat_percent_and_underscore_in_prefix_literally() {
        let store = setup().await;
        store.set("worklog:a_b", "1".to_string()).await.unwrap();
        store.set("worklog:axb", "2".to_string()).await.unwrap();
        let rows = store.scan_prefix("worklog:a_").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn should_report_whether_delete_removed_a_row() {
        let store = setup().await;
        store.set("k", "v".to_string()).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn should_grant_set_if_absent_once() {
        let store = setup().await;
        let ttl = Some(Duration::from_secs(30));
        assert!(store.set_if_absent("lock:running:p", "a".into(), ttl).await.unwrap());
        assert!(!store.set_if_absent("lock:running:p", "b".into(), ttl).await.unwrap());
        assert_eq!(
            store.get("lock:running:p").await.unwrap().as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn should_not_overwrite_permanent_entry_with_set_if_absent() {
        let store = setup().await;
        store.set("k", "kept".to_string()).await.unwrap();
        assert!(!store.set_if_absent("k", "new".into(), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn should_leave_entry_owned_by_another_value() {
        let store = setup().await;
        let ttl = Some(Duration::from_secs(30));
        assert!(store.set_if_absent("lock:running:p", "a".into(), ttl).await.unwrap());

        assert!(!store.delete_if_value("lock:running:p", "b").await.unwrap());
        assert_eq!(
            store.get("lock:running:p").await.unwrap().as_deref(),
            Some("a")
        );
        assert!(store.delete_if_value("lock:running:p", "a").await.unwrap());
        assert_eq!(store.get("lock:running:p").await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_take_over_expired_entry() {
        let store = setup().await;
        let ttl = Some(Duration::from_millis(20));
        assert!(store.set_if_absent("lock", "a".into(), ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.get("lock").await.unwrap(), None);
        assert!(store.set_if_absent("lock", "b".into(), ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn should_back_versioned_tasks() {
        let tasks = TaskService::new(setup().await);
        let task = Task::builder()
            .id("fill")
            .name("Fill tank")
            .parameter("litres", serde_json::json!(200))
            .build()
            .unwrap();
        tasks.save(task).await.unwrap();

        let id = TaskId::new("fill").unwrap();
        let fetched = tasks.get_task(&id).await.unwrap();
        assert_eq!(fetched.parameters["litres"], 200);
        assert_eq!(tasks.history(&id).await.unwrap().len(), 1);
    }
}
