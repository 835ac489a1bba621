//! In-process [`KeyValueStore`] backed by a `BTreeMap`.
//!
//! Used by tests and by deployments that do not need persistence. Expired
//! TTL entries are dropped lazily on access.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tankhub_domain::error::TankHubError;

use crate::ports::KeyValueStore;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Thread-safe in-memory key-value store.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<BTreeMap<String, Entry>>,
    offline: AtomicBool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the backend were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Entry>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), TankHubError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TankHubError::storage(std::io::Error::other(
                "in-memory store is offline",
            )))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, TankHubError>> + Send {
        let result = self.check_online().map(|()| {
            let now = Instant::now();
            self.lock()
                .get(key)
                .filter(|e| e.is_live(now))
                .map(|e| e.value.clone())
        });
        async { result }
    }

    fn set(
        &self,
        key: &str,
        value: String,
    ) -> impl Future<Output = Result<(), TankHubError>> + Send {
        let result = self.check_online().map(|()| {
            self.lock().insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: None,
                },
            );
        });
        async { result }
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        let result = self.check_online().map(|()| {
            let now = Instant::now();
            self.lock().remove(key).is_some_and(|e| e.is_live(now))
        });
        async { result }
    }

    fn delete_if_value(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        let result = self.check_online().map(|()| {
            let now = Instant::now();
            let mut entries = self.lock();
            let owned = entries
                .get(key)
                .is_some_and(|e| e.is_live(now) && e.value == expected);
            if owned {
                entries.remove(key);
            }
            owned
        });
        async { result }
    }

    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<(String, String)>, TankHubError>> + Send {
        let result = self.check_online().map(|()| {
            let now = Instant::now();
            self.lock()
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .filter(|(_, e)| e.is_live(now))
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect()
        });
        async { result }
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<bool, TankHubError>> + Send {
        let result = self.check_online().map(|()| {
            let now = Instant::now();
            let mut entries = self.lock();
            if entries.get(key).is_some_and(|e| e.is_live(now)) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: ttl.map(|ttl| now + ttl),
                },
            );
            true
        });
        async { result }
    }
}
