//! Retention policy and the work-log eviction algorithm.
//!
//! Eviction is computed per device: error logs may be exempt, the remaining
//! logs are bounded first by age and then by count. One device's volume never
//! affects another device's retention.

use std::collections::{BTreeMap, HashSet};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{TankHubError, ValidationError};
use crate::id::{DeviceId, LogId};
use crate::time::Timestamp;
use crate::work_log::WorkLog;

pub const MIN_MAX_AGE_DAYS: u32 = 1;
pub const MAX_MAX_AGE_DAYS: u32 = 365;
pub const MIN_MAX_LOGS_PER_DEVICE: u32 = 10;
pub const MAX_MAX_LOGS_PER_DEVICE: u32 = 10_000;

/// Process-wide retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub max_age_days: u32,
    pub max_logs_per_device: u32,
    pub auto_cleanup_enabled: bool,
    pub retain_error_logs: bool,
    #[serde(default)]
    pub last_cleanup_time: Option<Timestamp>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            max_logs_per_device: 1000,
            auto_cleanup_enabled: true,
            retain_error_logs: true,
            last_cleanup_time: None,
        }
    }
}

/// Operator-supplied partial update of the [`RetentionPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionPolicyPatch {
    pub max_age_days: Option<i64>,
    pub max_logs_per_device: Option<i64>,
    pub auto_cleanup_enabled: Option<bool>,
    pub retain_error_logs: Option<bool>,
}

fn check_range(field: &'static str, value: i64, min: u32, max: u32) -> Result<u32, ValidationError> {
    if value < i64::from(min) || value > i64::from(max) {
        return Err(ValidationError::OutOfRange {
            field,
            min: i64::from(min),
            max: i64::from(max),
            value,
        });
    }
    u32::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        min: i64::from(min),
        max: i64::from(max),
        value,
    })
}

impl RetentionPolicy {
    /// Return a copy with `patch` applied; every field is validated first.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfRange`] when `max_age_days` is outside
    /// `1..=365` or `max_logs_per_device` is outside `10..=10000`. Nothing is
    /// applied in that case.
    pub fn patched(&self, patch: &RetentionPolicyPatch) -> Result<Self, TankHubError> {
        let max_age_days = patch
            .max_age_days
            .map(|v| check_range("maxAgeDays", v, MIN_MAX_AGE_DAYS, MAX_MAX_AGE_DAYS))
            .transpose()?;
        let max_logs_per_device = patch
            .max_logs_per_device
            .map(|v| {
                check_range(
                    "maxLogsPerDevice",
                    v,
                    MIN_MAX_LOGS_PER_DEVICE,
                    MAX_MAX_LOGS_PER_DEVICE,
                )
            })
            .transpose()?;

        let mut next = self.clone();
        if let Some(v) = max_age_days {
            next.max_age_days = v;
        }
        if let Some(v) = max_logs_per_device {
            next.max_logs_per_device = v;
        }
        if let Some(v) = patch.auto_cleanup_enabled {
            next.auto_cleanup_enabled = v;
        }
        if let Some(v) = patch.retain_error_logs {
            next.retain_error_logs = v;
        }
        Ok(next)
    }

    /// Whether an automatic cleanup should run at `now` (at most once a day).
    #[must_use]
    pub fn is_cleanup_due(&self, now: Timestamp) -> bool {
        self.auto_cleanup_enabled
            && self
                .last_cleanup_time
                .is_none_or(|last| now - last >= Duration::days(1))
    }

    /// Oldest reference time a non-exempt log may have at `now`.
    #[must_use]
    pub fn cutoff(&self, now: Timestamp) -> Timestamp {
        now - Duration::days(i64::from(self.max_age_days))
    }

    /// Decide which logs survive. Pure: the caller performs the deletes.
    #[must_use]
    pub fn plan_eviction(&self, logs: &[WorkLog], now: Timestamp) -> EvictionPlan {
        let cutoff = self.cutoff(now);
        let limit = usize::try_from(self.max_logs_per_device).unwrap_or(usize::MAX);

        let mut by_device: BTreeMap<&DeviceId, Vec<&WorkLog>> = BTreeMap::new();
        for log in logs {
            by_device.entry(&log.device_id).or_default().push(log);
        }

        let mut keep: HashSet<&LogId> = HashSet::with_capacity(logs.len());
        for device_logs in by_device.values() {
            let (exempt, mut candidates): (Vec<&WorkLog>, Vec<&WorkLog>) = device_logs
                .iter()
                .copied()
                .partition(|log| self.retain_error_logs && log.is_error());
            keep.extend(exempt.into_iter().map(|log| &log.id));

            candidates.retain(|log| log.reference_time() >= cutoff);
            if candidates.len() > limit {
                candidates.sort_by_key(|log| std::cmp::Reverse(log.reference_time()));
                candidates.truncate(limit);
            }
            keep.extend(candidates.into_iter().map(|log| &log.id));
        }

        let evict = logs
            .iter()
            .filter(|log| !keep.contains(&log.id))
            .map(|log| log.id.clone())
            .collect();

        EvictionPlan {
            before: logs.len(),
            devices: by_device.len(),
            evict,
        }
    }
}

/// Result of [`RetentionPolicy::plan_eviction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionPlan {
    pub before: usize,
    pub devices: usize,
    pub evict: Vec<LogId>,
}

impl EvictionPlan {
    #[must_use]
    pub fn after(&self) -> usize {
        self.before - self.evict.len()
    }
}
