//! Versioned record store: current snapshot plus append-only history.
//!
//! Layout for a namespace `ns`: `ns:current:{id}` holds the current
//! [`RecordVersion`], `ns:history:{id}` the full [`VersionHistory`]. History
//! is always written before the current pointer, so a failure between the
//! two writes never loses an edit.

use tankhub_domain::error::{NotFoundError, TankHubError};
use tankhub_domain::time::{self, Timestamp};
use tankhub_domain::version::{RecordVersion, Resolution, VersionHistory, Versioned, resolve};

use crate::collection::Collection;
use crate::ports::KeyValueStore;

/// Result of [`VersionedStore::put`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutOutcome<T> {
    /// Whether the written snapshot became current.
    pub accepted: bool,
    /// Version the written snapshot was archived under.
    pub version: u64,
    /// The current version after the write.
    pub current: RecordVersion<T>,
}

/// Last-write-wins store for one kind of [`Versioned`] record.
pub struct VersionedStore<S, T> {
    current: Collection<S, RecordVersion<T>>,
    history: Collection<S, VersionHistory<T>>,
}

impl<S: Clone, T> Clone for VersionedStore<S, T> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
            history: self.history.clone(),
        }
    }
}

impl<S, T> VersionedStore<S, T>
where
    S: KeyValueStore + Clone,
    T: Versioned,
{
    pub fn new(store: S, namespace: &str) -> Self {
        Self {
            current: Collection::new(store.clone(), format!("{namespace}:current")),
            history: Collection::new(store, format!("{namespace}:history")),
        }
    }

    /// Offer `candidate` as the next snapshot of its record.
    ///
    /// The candidate is always archived. It becomes current when the version
    /// minted for it is the highest in history, that is when its
    /// `updated_at` is not older than the current one.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the store fails.
    pub async fn put(&self, candidate: T) -> Result<PutOutcome<T>, TankHubError> {
        let id = candidate.record_id();
        let mut history = self.history.get(&id).await?.unwrap_or_default();
        let current = self.current.get(&id).await?;
        if let Some(current) = &current {
            history.ensure(current);
        }

        let entry = history.append(candidate);
        let accepted = resolve(current.as_ref(), &entry) == Resolution::CandidateWins;
        self.history.put(&id, &history).await?;

        let current = match current {
            Some(current) if !accepted => {
                tracing::info!(
                    entity = T::ENTITY,
                    id = %id,
                    version = entry.version,
                    current_version = current.version,
                    "stale write archived without becoming current"
                );
                current
            }
            _ => {
                self.current.put(&id, &entry).await?;
                entry.clone()
            }
        };

        Ok(PutOutcome {
            accepted,
            version: entry.version,
            current,
        })
    }

    /// Current version of a record, if any.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the store fails.
    pub async fn get(&self, id: &str) -> Result<Option<RecordVersion<T>>, TankHubError> {
        self.current.get(id).await
    }

    /// All current snapshots, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the store fails.
    pub async fn list(&self) -> Result<Vec<RecordVersion<T>>, TankHubError> {
        self.current.all().await
    }

    /// Every archived version of a record in ascending version order.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the store fails.
    pub async fn history(&self, id: &str) -> Result<Vec<RecordVersion<T>>, TankHubError> {
        Ok(self
            .history
            .get(id)
            .await?
            .map(VersionHistory::into_vec)
            .unwrap_or_default())
    }

    /// Make an archived version current again under a fresh version number.
    ///
    /// The restored snapshot is stamped strictly after the version it
    /// replaces, so its minted version is the highest in history.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the record or the version does not
    /// exist, or [`TankHubError::Storage`] if the store fails.
    pub async fn restore(&self, id: &str, version: u64) -> Result<RecordVersion<T>, TankHubError> {
        let current = self.current.get(id).await?.ok_or_else(|| NotFoundError {
            entity: T::ENTITY,
            id: id.to_string(),
        })?;
        let mut history = self.history.get(id).await?.unwrap_or_default();
        history.ensure(&current);

        let mut snapshot = history
            .find(version)
            .map(|entry| entry.snapshot.clone())
            .ok_or_else(|| NotFoundError {
                entity: "Version",
                id: format!("{id}@{version}"),
            })?;
        snapshot.set_updated_at(restore_stamp(time::now(), current.snapshot.updated_at()));

        let entry = history.append(snapshot);
        self.history.put(id, &history).await?;
        self.current.put(id, &entry).await?;
        Ok(entry)
    }

    /// Delete every record and its whole history. Returns the number of
    /// records removed.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Storage`] if the store fails; records deleted
    /// before the failure stay deleted.
    pub async fn clear_all(&self) -> Result<usize, TankHubError> {
        let mut removed = 0;
        for id in self.current.ids().await? {
            if self.current.delete(&id).await? {
                removed += 1;
            }
        }
        for id in self.history.ids().await? {
            self.history.delete(&id).await?;
        }
        Ok(removed)
    }
}

fn restore_stamp(now: Timestamp, current: Timestamp) -> Timestamp {
    now.max(current + chrono::Duration::milliseconds(1))
}
