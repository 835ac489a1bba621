//! Record versions: immutable snapshots and last-write-wins resolution.
//!
//! A version number is minted from the snapshot's `updated_at` (millisecond
//! precision) followed by its arrival order within that millisecond:
//! `version = millis * VERSIONS_PER_MILLI + n`. History is ordered by
//! `version` alone and the current snapshot is always the maximum, so a
//! late-arriving edit that lost conflict resolution still lands in history,
//! numbered below the snapshot that beat it. Numbers never change once
//! written.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Versions available per millisecond of `updated_at` before spilling into
/// the next millisecond's range.
pub const VERSIONS_PER_MILLI: u64 = 1000;

/// A record that can be stored with version history.
pub trait Versioned: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human-readable entity name used in errors (e.g. `"Task"`).
    const ENTITY: &'static str;

    /// Identity of the record within its namespace.
    fn record_id(&self) -> String;

    /// Last modification time, as claimed by the writer.
    fn updated_at(&self) -> Timestamp;

    /// Overwrite the modification time.
    fn set_updated_at(&mut self, updated_at: Timestamp);
}

/// One immutable entry of a record's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordVersion<T> {
    pub version: u64,
    pub snapshot: T,
}

/// Smallest version a snapshot stamped `updated_at` can receive.
#[must_use]
pub fn version_floor(updated_at: Timestamp) -> u64 {
    u64::try_from(updated_at.timestamp_millis())
        .unwrap_or(0)
        .saturating_mul(VERSIONS_PER_MILLI)
        .max(1)
}

/// Outcome of comparing an incoming candidate with the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The candidate becomes the new current snapshot.
    CandidateWins,
    /// The current snapshot stays; the candidate is only archived.
    CurrentWins,
}

/// Last-write-wins over minted versions.
///
/// A strictly newer `updated_at` always mints a higher version, and a
/// candidate stamped in the same millisecond as the current snapshot is
/// numbered after it, so ties go to the incoming writer.
#[must_use]
pub fn resolve<T>(current: Option<&RecordVersion<T>>, candidate: &RecordVersion<T>) -> Resolution {
    match current {
        Some(current) if current.version > candidate.version => Resolution::CurrentWins,
        _ => Resolution::CandidateWins,
    }
}

/// Full history of one record, ordered by version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionHistory<T> {
    versions: Vec<RecordVersion<T>>,
}

impl<T> Default for VersionHistory<T> {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
        }
    }
}

impl<T: Versioned> VersionHistory<T> {
    /// Number of stored versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Version the next snapshot stamped `updated_at` would receive.
    #[must_use]
    pub fn next_version(&self, updated_at: Timestamp) -> u64 {
        let floor = version_floor(updated_at);
        let ceiling = floor.saturating_add(VERSIONS_PER_MILLI);
        let mut version = self
            .versions
            .iter()
            .map(|v| v.version)
            .filter(|v| (floor..ceiling).contains(v))
            .max()
            .map_or(floor, |v| v + 1);
        while self.find(version).is_some() {
            version += 1;
        }
        version
    }

    /// Archive `snapshot` under a freshly minted version.
    pub fn append(&mut self, snapshot: T) -> RecordVersion<T> {
        let entry = RecordVersion {
            version: self.next_version(snapshot.updated_at()),
            snapshot,
        };
        self.insert(entry.clone());
        entry
    }

    /// Archive an already-numbered entry unless that number is present.
    pub fn ensure(&mut self, entry: &RecordVersion<T>) {
        if self.find(entry.version).is_none() {
            self.insert(entry.clone());
        }
    }

    fn insert(&mut self, entry: RecordVersion<T>) {
        let position = self
            .versions
            .partition_point(|existing| existing.version < entry.version);
        self.versions.insert(position, entry);
    }

    /// Look up a version by its number.
    #[must_use]
    pub fn find(&self, version: u64) -> Option<&RecordVersion<T>> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// The entry with the highest version.
    #[must_use]
    pub fn latest(&self) -> Option<&RecordVersion<T>> {
        self.versions.last()
    }

    /// Iterate in ascending version order.
    pub fn iter(&self) -> impl Iterator<Item = &RecordVersion<T>> {
        self.versions.iter()
    }

    /// Consume into an ascending vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<RecordVersion<T>> {
        self.versions
    }
}
