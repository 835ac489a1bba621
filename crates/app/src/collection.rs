//! Typed JSON namespace on top of a [`KeyValueStore`].
//!
//! A `Collection` owns one key prefix (`{namespace}:`) and (de)serializes its
//! values with `serde_json`. A value that no longer decodes is a
//! [`TankHubError::Corrupt`] on direct reads; listings log it and skip it.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tankhub_domain::error::{CorruptRecordError, TankHubError};

use crate::ports::KeyValueStore;

/// Typed view over the keys `{namespace}:{id}`.
pub struct Collection<S, T> {
    store: S,
    namespace: String,
    _marker: PhantomData<fn() -> T>,
}

impl<S: Clone, T> Clone for Collection<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S, T> Collection<S, T>
where
    S: KeyValueStore,
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            _marker: PhantomData,
        }
    }

    /// Full store key of `id`.
    #[must_use]
    pub fn key(&self, id: &str) -> String {
        format!("{}:{id}", self.namespace)
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    /// Access to the raw store for operations outside this namespace.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the store fails, or
    /// [`TankHubError::Corrupt`] if the stored value does not decode.
    pub async fn get(&self, id: &str) -> Result<Option<T>, TankHubError> {
        let key = self.key(id);
        match self.store.get(&key).await? {
            Some(raw) => decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if encoding or the write fails.
    pub async fn put(&self, id: &str, value: &T) -> Result<(), TankHubError> {
        let raw = serde_json::to_string(value).map_err(TankHubError::storage)?;
        self.store.set(&self.key(id), raw).await
    }

    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the store fails.
    pub async fn delete(&self, id: &str) -> Result<bool, TankHubError> {
        self.store.delete(&self.key(id)).await
    }

    /// Every decodable value of the namespace, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the scan fails.
    pub async fn all(&self) -> Result<Vec<T>, TankHubError> {
        Ok(self
            .store
            .scan_prefix(&self.prefix())
            .await?
            .iter()
            .filter_map(|(key, raw)| match decode(key, raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(%key, error = %err, "skipping unreadable value");
                    None
                }
            })
            .collect())
    }

    /// Ids (key suffixes) present in the namespace.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the scan fails.
    pub async fn ids(&self) -> Result<Vec<String>, TankHubError> {
        let prefix = self.prefix();
        Ok(self
            .store
            .scan_prefix(&prefix)
            .await?
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, TankHubError> {
    serde_json::from_str(raw).map_err(|err| {
        CorruptRecordError {
            key: key.to_string(),
            reason: err.to_string(),
        }
        .into()
    })
}
