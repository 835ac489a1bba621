//! Log retention store: device work logs with per-device eviction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tankhub_domain::error::{NotFoundError, TankHubError, ValidationError};
use tankhub_domain::id::{DeviceId, LogId, TaskId};
use tankhub_domain::retention::{RetentionPolicy, RetentionPolicyPatch};
use tankhub_domain::time::{self, Timestamp};
use tankhub_domain::work_log::{WorkLog, WorkLogDraft, WorkLogPatch, WorkLogStatus};

use crate::collection::Collection;
use crate::ports::KeyValueStore;

/// Namespace work logs are stored under.
pub const LOG_NAMESPACE: &str = "worklog";
const POLICY_NAMESPACE: &str = "retention";
const POLICY_ID: &str = "policy";

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 500;

/// Filters and paging of [`LogStore::query`]. Every filter is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogQuery {
    pub device_id: Option<DeviceId>,
    pub task_id: Option<TaskId>,
    pub status: Option<WorkLogStatus>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    /// 1-based page number.
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl LogQuery {
    fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    fn matches(&self, log: &WorkLog) -> bool {
        let at = log.reference_time();
        self.device_id.as_ref().is_none_or(|id| &log.device_id == id)
            && self
                .task_id
                .as_ref()
                .is_none_or(|id| log.task_id.as_ref() == Some(id))
            && self.status.is_none_or(|status| log.status == status)
            && self.from.is_none_or(|from| at >= from)
            && self.to.is_none_or(|to| at <= to)
    }
}

/// One page of [`LogStore::query`] results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub logs: Vec<WorkLog>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// What a retention run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub before: usize,
    pub after: usize,
    pub removed: usize,
    pub devices: usize,
    pub ran_at: Timestamp,
}

/// Aggregate numbers over all stored logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total_logs: usize,
    pub devices: BTreeMap<String, usize>,
    pub error_logs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<Timestamp>,
}

/// Application service for work logs and their retention policy.
pub struct LogStore<S> {
    logs: Collection<S, WorkLog>,
    policies: Collection<S, RetentionPolicy>,
}

impl<S: KeyValueStore + Clone> LogStore<S> {
    /// Create a new log store on top of the given store.
    pub fn new(store: S) -> Self {
        Self {
            logs: Collection::new(store.clone(), LOG_NAMESPACE),
            policies: Collection::new(store, POLICY_NAMESPACE),
        }
    }

    /// Store a log reported by a device, upserting by id.
    ///
    /// Runs the retention cleanup afterwards when it is due. A failing
    /// cleanup is logged and does not fail the append.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if the device id is blank, or a
    /// storage error if the log cannot be written.
    #[tracing::instrument(skip(self, draft), fields(device_id = %draft.device_id, status = %draft.status))]
    pub async fn append(&self, mut draft: WorkLogDraft) -> Result<WorkLog, TankHubError> {
        if draft.device_id.is_blank() {
            return Err(ValidationError::EmptyId.into());
        }
        if let Some(id) = &draft.id
            && draft.created_at.is_none()
            && let Some(existing) = self.logs.get(id.as_str()).await?
        {
            draft.created_at = existing.created_at;
        }
        let log = draft.into_log(time::now());
        self.logs.put(log.id.as_str(), &log).await?;
        tracing::debug!(log_id = %log.id, "work log stored");

        match self.run_due_cleanup().await {
            Ok(Some(report)) => tracing::info!(removed = report.removed, "automatic cleanup ran"),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "automatic cleanup failed"),
        }
        Ok(log)
    }

    /// Patch an existing log by id.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the log does not exist, or a
    /// storage error.
    #[tracing::instrument(skip(self, patch))]
    pub async fn patch(&self, id: &LogId, patch: WorkLogPatch) -> Result<WorkLog, TankHubError> {
        let mut log = self.get(id).await?;
        log.apply(patch);
        self.logs.put(id.as_str(), &log).await?;
        Ok(log)
    }

    /// # Errors
    ///
    /// Returns [`TankHubError::NotFound`] if the log does not exist, or a
    /// storage error.
    pub async fn get(&self, id: &LogId) -> Result<WorkLog, TankHubError> {
        self.logs.get(id.as_str()).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Work log",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// Filtered logs, newest first, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if `from` is after `to`, or a
    /// storage error.
    #[tracing::instrument(skip(self))]
    pub async fn query(&self, query: &LogQuery) -> Result<LogPage, TankHubError> {
        if let (Some(from), Some(to)) = (query.from, query.to)
            && from > to
        {
            return Err(ValidationError::InvertedRange.into());
        }
        let page = query.page();
        let limit = query.limit();

        let mut matching: Vec<WorkLog> = self
            .logs
            .all()
            .await?
            .into_iter()
            .filter(|log| query.matches(log))
            .collect();
        matching.sort_by(|a, b| b.reference_time().cmp(&a.reference_time()));

        let total = matching.len();
        let logs = matching
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Ok(LogPage {
            logs,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Apply the retention policy now.
    ///
    /// Only the logs chosen for eviction are deleted, so logs appended while
    /// the cleanup runs are kept.
    ///
    /// # Errors
    ///
    /// Returns a storage error. Logs deleted before the failure stay deleted.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup(&self) -> Result<CleanupReport, TankHubError> {
        let policy = self.policy().await?;
        let now = time::now();
        let logs = self.logs.all().await?;
        let plan = policy.plan_eviction(&logs, now);

        for id in &plan.evict {
            self.logs.delete(id.as_str()).await?;
        }

        // Re-read so a concurrent policy update is not overwritten.
        let mut latest = self.policy().await?;
        latest.last_cleanup_time = Some(now);
        self.policies.put(POLICY_ID, &latest).await?;

        let report = CleanupReport {
            before: plan.before,
            after: plan.after(),
            removed: plan.evict.len(),
            devices: plan.devices,
            ran_at: now,
        };
        tracing::info!(
            before = report.before,
            after = report.after,
            devices = report.devices,
            "retention cleanup finished"
        );
        Ok(report)
    }

    /// Run [`Self::cleanup`] if the policy says it is due.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    pub async fn run_due_cleanup(&self) -> Result<Option<CleanupReport>, TankHubError> {
        if self.policy().await?.is_cleanup_due(time::now()) {
            self.cleanup().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// The current policy; defaults when none was ever stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    pub async fn policy(&self) -> Result<RetentionPolicy, TankHubError> {
        Ok(self.policies.get(POLICY_ID).await?.unwrap_or_default())
    }

    /// Validate and apply a partial policy update.
    ///
    /// # Errors
    ///
    /// Returns [`TankHubError::Validation`] if a bound is out of range (the
    /// stored policy is left untouched), or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn update_policy(
        &self,
        patch: RetentionPolicyPatch,
    ) -> Result<RetentionPolicy, TankHubError> {
        let next = self.policy().await?.patched(&patch)?;
        self.policies.put(POLICY_ID, &next).await?;
        tracing::info!(
            max_age_days = next.max_age_days,
            max_logs_per_device = next.max_logs_per_device,
            "retention policy updated"
        );
        Ok(next)
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    pub async fn stats(&self) -> Result<LogStats, TankHubError> {
        let mut stats = LogStats::default();
        for log in self.logs.all().await? {
            let at = log.reference_time();
            stats.total_logs += 1;
            *stats
                .devices
                .entry(log.device_id.to_string())
                .or_default() += 1;
            if log.is_error() {
                stats.error_logs += 1;
            }
            stats.oldest = Some(stats.oldest.map_or(at, |t| t.min(at)));
            stats.newest = Some(stats.newest.map_or(at, |t| t.max(at)));
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use tankhub_domain::error::ErrorKind;

    use super::*;
    use crate::memory_store::InMemoryStore;

    fn make_store() -> LogStore<Arc<InMemoryStore>> {
        LogStore::new(Arc::new(InMemoryStore::new()))
    }

    fn draft(device: &str, status: WorkLogStatus, at: Timestamp) -> WorkLogDraft {
        let mut draft = WorkLogDraft::new(DeviceId::new(device).unwrap(), status);
        draft.start_time = Some(at);
        draft.created_at = Some(at);
        draft
    }

    async fn disable_auto_cleanup(store: &LogStore<Arc<InMemoryStore>>) {
        store
            .update_policy(RetentionPolicyPatch {
                auto_cleanup_enabled: Some(false),
                ..RetentionPolicyPatch::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_assign_id_and_compute_execution_time() {
        let store = make_store();
        let start = time::now();
        let mut d = draft("pump-1", WorkLogStatus::Completed, start);
        d.end_time = Some(start + Duration::milliseconds(2500));

        let log = store.append(d).await.unwrap();
        assert!(!log.id.is_blank());
        assert_eq!(log.execution_time, Some(2500));
        assert_eq!(store.get(&log.id).await.unwrap(), log);
    }

    #[tokio::test]
    async fn should_upsert_by_id_and_keep_created_at() {
        let store = make_store();
        let first = store
            .append(WorkLogDraft::new(
                DeviceId::new("pump-1").unwrap(),
                WorkLogStatus::Running,
            ))
            .await
            .unwrap();

        let mut update = WorkLogDraft::new(DeviceId::new("pump-1").unwrap(), WorkLogStatus::Completed);
        update.id = Some(first.id.clone());
        let second = store.append(update).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(store.stats().await.unwrap().total_logs, 1);
    }

    #[tokio::test]
    async fn should_patch_existing_log_and_reject_unknown_id() {
        let store = make_store();
        let start = time::now();
        let log = store
            .append(draft("valve-2", WorkLogStatus::Running, start))
            .await
            .unwrap();

        let patched = store
            .patch(
                &log.id,
                WorkLogPatch {
                    status: Some(WorkLogStatus::Completed),
                    end_time: Some(start + Duration::seconds(4)),
                    ..WorkLogPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(patched.execution_time, Some(4000));

        let err = store
            .patch(&LogId::new("nope").unwrap(), WorkLogPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn should_filter_and_page_newest_first() {
        let store = make_store();
        disable_auto_cleanup(&store).await;
        let t0 = time::now();
        for i in 0..5 {
            store
                .append(draft("pump-1", WorkLogStatus::Completed, t0 - Duration::minutes(i)))
                .await
                .unwrap();
        }
        store
            .append(draft("pump-2", WorkLogStatus::Error, t0))
            .await
            .unwrap();

        let page = store
            .query(&LogQuery {
                device_id: Some(DeviceId::new("pump-1").unwrap()),
                page: Some(2),
                limit: Some(2),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.logs.len(), 2);
        assert_eq!(page.logs[0].reference_time(), t0 - Duration::minutes(2));

        let errors = store
            .query(&LogQuery {
                status: Some(WorkLogStatus::Error),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.total, 1);
        assert_eq!(errors.limit, DEFAULT_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn should_filter_by_date_range_and_reject_inverted_range() {
        let store = make_store();
        disable_auto_cleanup(&store).await;
        let t0 = time::now();
        for days in [1, 3, 5] {
            store
                .append(draft("pump-1", WorkLogStatus::Completed, t0 - Duration::days(days)))
                .await
                .unwrap();
        }

        let page = store
            .query(&LogQuery {
                from: Some(t0 - Duration::days(4)),
                to: Some(t0 - Duration::days(2)),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let err = store
            .query(&LogQuery {
                from: Some(t0),
                to: Some(t0 - Duration::days(1)),
                ..LogQuery::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn should_clamp_limit() {
        let store = make_store();
        let page = store
            .query(&LogQuery {
                limit: Some(10_000),
                page: Some(0),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 0);
    }

    #[tokio::test]
    async fn should_keep_errors_and_newest_thousand_per_device() {
        let store = make_store();
        disable_auto_cleanup(&store).await;
        let t0 = time::now();
        for i in 0..1195 {
            store
                .append(draft("pump-1", WorkLogStatus::Completed, t0 - Duration::seconds(i)))
                .await
                .unwrap();
        }
        for i in 0..5 {
            store
                .append(draft("pump-1", WorkLogStatus::Error, t0 - Duration::hours(2 + i)))
                .await
                .unwrap();
        }

        let report = store.cleanup().await.unwrap();
        assert_eq!(report.before, 1200);
        assert_eq!(report.after, 1005);
        assert_eq!(report.removed, 195);
        assert_eq!(report.devices, 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_logs, 1005);
        assert_eq!(stats.error_logs, 5);
        assert_eq!(
            store.policy().await.unwrap().last_cleanup_time,
            Some(report.ran_at)
        );
    }

    #[tokio::test]
    async fn should_drop_only_non_error_logs_past_max_age() {
        let store = make_store();
        disable_auto_cleanup(&store).await;
        let t0 = time::now();
        let old = store
            .append(draft("valve-1", WorkLogStatus::Completed, t0 - Duration::days(40)))
            .await
            .unwrap();
        let young = store
            .append(draft("valve-1", WorkLogStatus::Completed, t0 - Duration::days(10)))
            .await
            .unwrap();
        let old_error = store
            .append(draft("valve-1", WorkLogStatus::Error, t0 - Duration::days(40)))
            .await
            .unwrap();

        store.cleanup().await.unwrap();
        assert_eq!(
            store.get(&old.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(store.get(&young.id).await.is_ok());
        assert!(store.get(&old_error.id).await.is_ok());
    }

    #[tokio::test]
    async fn should_run_cleanup_automatically_once_per_day() {
        let store = make_store();
        let t0 = time::now();
        let stale = store
            .append(draft("pump-1", WorkLogStatus::Completed, t0 - Duration::days(90)))
            .await
            .unwrap();

        // The first append made the cleanup due, and it evicted the stale log.
        assert!(store.get(&stale.id).await.is_err());
        let ran_at = store.policy().await.unwrap().last_cleanup_time;
        assert!(ran_at.is_some());

        let second_stale = store
            .append(draft("pump-1", WorkLogStatus::Completed, t0 - Duration::days(90)))
            .await
            .unwrap();
        assert!(store.get(&second_stale.id).await.is_ok());
        assert_eq!(store.policy().await.unwrap().last_cleanup_time, ran_at);
    }

    #[tokio::test]
    async fn should_reject_out_of_range_policy_and_keep_previous_values() {
        let store = make_store();
        let err = store
            .update_policy(RetentionPolicyPatch {
                max_age_days: Some(400),
                ..RetentionPolicyPatch::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(store.policy().await.unwrap(), RetentionPolicy::default());
    }

    #[tokio::test]
    async fn should_aggregate_stats_per_device() {
        let store = make_store();
        disable_auto_cleanup(&store).await;
        let t0 = time::now();
        store
            .append(draft("pump-1", WorkLogStatus::Completed, t0 - Duration::hours(1)))
            .await
            .unwrap();
        store
            .append(draft("pump-1", WorkLogStatus::Error, t0))
            .await
            .unwrap();
        store
            .append(draft("valve-1", WorkLogStatus::Running, t0 - Duration::hours(2)))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_logs, 3);
        assert_eq!(stats.devices.get("pump-1"), Some(&2));
        assert_eq!(stats.error_logs, 1);
        assert_eq!(stats.oldest, Some(t0 - Duration::hours(2)));
        assert_eq!(stats.newest, Some(t0));
    }
}
