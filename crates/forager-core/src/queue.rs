use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{ClassifiedError, ProductError, RecoveryPolicy};
use crate::job::{JobItem, JobKind, JobStatus, QueueStats};

/// In-memory job queue with immutable terminal states.
///
/// A failed item stays failed. When a failure is retryable and within the
/// recovery policy's budget, `fail` enqueues a fresh pending item carrying
/// the incremented attempt count and a `not_before` backoff, so the retry
/// lineage is visible in the job list rather than overwritten in place.
pub struct InMemoryJobQueue {
    items: Mutex<HashMap<Uuid, JobItem>>,
    policy: RecoveryPolicy,
}

impl InMemoryJobQueue {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    pub fn enqueue(&self, item: JobItem) -> Result<Uuid, ProductError> {
        let id = item.id;
        let mut items = self.lock()?;
        items.insert(id, item);
        Ok(id)
    }

    pub fn enqueue_new(&self, kind: JobKind, targets: Vec<String>) -> Result<Uuid, ProductError> {
        self.enqueue(JobItem::new(kind, targets))
    }

    /// Claim the oldest ready pending item, marking it running.
    ///
    /// Items whose `not_before` is in the future are skipped. Returns `None`
    /// when nothing is ready.
    pub fn claim_next(&self) -> Result<Option<JobItem>, ProductError> {
        let now = Utc::now();
        let mut items = self.lock()?;

        let next_id = items
            .values()
            .filter(|item| item.ready_at(now))
            .min_by_key(|item| item.created_at)
            .map(|item| item.id);

        let Some(id) = next_id else {
            return Ok(None);
        };
        let item = items
            .get_mut(&id)
            .ok_or_else(|| ProductError::System("claimed job vanished".to_string()))?;
        item.status = JobStatus::Running;
        item.started_at = Some(now);
        Ok(Some(item.clone()))
    }

    /// Mark an item succeeded, recording how each target fared.
    ///
    /// Terminal states are written exactly once: completing an already
    /// succeeded or failed item is an error, never a silent overwrite.
    pub fn complete(&self, id: Uuid, succeeded: u32, failed: u32) -> Result<(), ProductError> {
        let mut items = self.lock()?;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| ProductError::NotFound(format!("job {id}")))?;
        if item.status.is_terminal() {
            return Err(ProductError::InvalidInput(format!(
                "job {id} is already {}",
                item.status
            )));
        }
        item.status = JobStatus::Succeeded;
        item.finished_at = Some(Utc::now());
        item.succeeded = succeeded;
        item.failed = failed;
        Ok(())
    }

    /// Mark an item failed. If the error is retryable and the attempt budget
    /// allows, a follow-up item is enqueued with exponential backoff; its id
    /// is returned so callers can trace the lineage. Like `complete`, this
    /// refuses items that already reached a terminal state.
    pub fn fail(
        &self,
        id: Uuid,
        error: ClassifiedError,
        succeeded: u32,
        failed: u32,
    ) -> Result<Option<Uuid>, ProductError> {
        let mut items = self.lock()?;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| ProductError::NotFound(format!("job {id}")))?;
        if item.status.is_terminal() {
            return Err(ProductError::InvalidInput(format!(
                "job {id} is already {}",
                item.status
            )));
        }
        item.status = JobStatus::Failed;
        item.finished_at = Some(Utc::now());
        item.error = Some(error.clone());
        item.succeeded = succeeded;
        item.failed = failed;

        let attempt = item.attempt;
        if !self.policy.should_retry(&error) || attempt + 1 > self.policy.max_retries {
            return Ok(None);
        }

        let mut retry = JobItem::new(item.kind, item.targets.clone());
        retry.affiliate_tag = item.affiliate_tag.clone();
        retry.attempt = attempt + 1;
        retry.not_before = Some(
            Utc::now()
                + chrono::Duration::from_std(self.policy.retry_delay(retry.attempt))
                    .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        );
        let retry_id = retry.id;
        items.insert(retry_id, retry);
        Ok(Some(retry_id))
    }

    pub fn get(&self, id: Uuid) -> Result<Option<JobItem>, ProductError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    /// List jobs, newest first, optionally filtered by status.
    pub fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<JobItem>, ProductError> {
        let items = self.lock()?;
        let mut listed: Vec<JobItem> = items
            .values()
            .filter(|item| status.is_none_or(|s| item.status == s))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        listed.truncate(limit);
        Ok(listed)
    }

    /// All four counters read under a single lock, so the snapshot is
    /// internally consistent.
    pub fn stats(&self) -> Result<QueueStats, ProductError> {
        let items = self.lock()?;
        let mut stats = QueueStats::default();
        for item in items.values() {
            match item.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Succeeded => stats.succeeded += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    pub fn backlog(&self) -> Result<usize, ProductError> {
        Ok(self.stats()?.backlog())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, JobItem>>, ProductError> {
        self.items
            .lock()
            .map_err(|_| ProductError::System("job queue lock poisoned".to_string()))
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(RecoveryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;

    fn retryable_error() -> ClassifiedError {
        classify(&ProductError::Network("refused".into()))
    }

    fn permanent_error() -> ClassifiedError {
        classify(&ProductError::NotFound("gone".into()))
    }

    #[test]
    fn claim_marks_running_and_is_fifo() {
        let queue = InMemoryJobQueue::default();
        let first = queue
            .enqueue_new(JobKind::RefreshImage, vec!["B08N5WRWNW".into()])
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        queue
            .enqueue_new(JobKind::ValidateLink, vec!["https://example.com".into()])
            .unwrap();

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(queue.get(first).unwrap().unwrap().status, JobStatus::Running);
    }

    #[test]
    fn claim_skips_backoff_delayed_items() {
        let queue = InMemoryJobQueue::default();
        let mut item = JobItem::new(JobKind::BulkScrape, vec!["B08N5WRWNW".into()]);
        item.not_before = Some(Utc::now() + chrono::Duration::seconds(60));
        queue.enqueue(item).unwrap();

        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn failed_item_stays_failed_and_retry_is_a_new_item() {
        let queue = InMemoryJobQueue::default();
        let id = queue
            .enqueue_new(JobKind::RefreshImage, vec!["B08N5WRWNW".into()])
            .unwrap();
        queue.claim_next().unwrap().unwrap();

        let retry_id = queue.fail(id, retryable_error(), 0, 1).unwrap().unwrap();
        assert_ne!(retry_id, id);

        let original = queue.get(id).unwrap().unwrap();
        assert_eq!(original.status, JobStatus::Failed);
        assert!(original.error.is_some());
        assert_eq!(original.failed, 1);

        let retry = queue.get(retry_id).unwrap().unwrap();
        assert_eq!(retry.status, JobStatus::Pending);
        assert_eq!(retry.attempt, 1);
        assert!(retry.not_before.unwrap() > Utc::now());
        assert_eq!(retry.targets, original.targets);
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let queue = InMemoryJobQueue::default();
        let id = queue
            .enqueue_new(JobKind::ValidateLink, vec!["https://example.com".into()])
            .unwrap();
        queue.claim_next().unwrap().unwrap();

        assert!(queue.fail(id, permanent_error(), 0, 1).unwrap().is_none());
        assert_eq!(queue.get(id).unwrap().unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn terminal_state_is_written_exactly_once() {
        let queue = InMemoryJobQueue::default();
        let id = queue
            .enqueue_new(JobKind::RefreshImage, vec!["B08N5WRWNW".into()])
            .unwrap();
        queue.claim_next().unwrap().unwrap();
        queue.fail(id, permanent_error(), 0, 1).unwrap();

        // A failed item can neither be completed nor failed again.
        assert!(queue.complete(id, 1, 0).is_err());
        assert!(queue.fail(id, permanent_error(), 0, 1).is_err());
        assert_eq!(queue.get(id).unwrap().unwrap().status, JobStatus::Failed);

        let id = queue
            .enqueue_new(JobKind::RefreshImage, vec!["B07XYZ1234".into()])
            .unwrap();
        queue.claim_next().unwrap().unwrap();
        queue.complete(id, 1, 0).unwrap();

        assert!(queue.fail(id, retryable_error(), 0, 1).is_err());
        let item = queue.get(id).unwrap().unwrap();
        assert_eq!(item.status, JobStatus::Succeeded);
        assert!(item.error.is_none());
    }

    #[test]
    fn retry_budget_is_bounded() {
        let queue = InMemoryJobQueue::default();
        let mut item = JobItem::new(JobKind::RefreshImage, vec!["B08N5WRWNW".into()]);
        item.attempt = 3; // already at max_retries
        let id = queue.enqueue(item).unwrap();

        assert!(queue.fail(id, retryable_error(), 0, 1).unwrap().is_none());
    }

    #[test]
    fn stats_count_every_state() {
        let queue = InMemoryJobQueue::default();
        let a = queue
            .enqueue_new(JobKind::BulkScrape, vec!["B08N5WRWNW".into()])
            .unwrap();
        queue
            .enqueue_new(JobKind::BulkScrape, vec!["B07XYZ1234".into()])
            .unwrap();
        queue.claim_next().unwrap().unwrap();
        queue.complete(a, 1, 0).unwrap();

        let stats = queue.stats().unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.backlog(), 1);
    }

    #[test]
    fn complete_records_per_target_tallies() {
        let queue = InMemoryJobQueue::default();
        let id = queue
            .enqueue_new(
                JobKind::BulkScrape,
                vec!["B08N5WRWNW".into(), "B07XYZ1234".into(), "B01ABCDEF0".into()],
            )
            .unwrap();
        queue.claim_next().unwrap().unwrap();
        queue.complete(id, 3, 0).unwrap();

        let item = queue.get(id).unwrap().unwrap();
        assert_eq!(item.succeeded, 3);
        assert_eq!(item.failed, 0);
    }

    #[test]
    fn completing_unknown_job_is_not_found() {
        let queue = InMemoryJobQueue::default();
        let err = queue.complete(Uuid::new_v4(), 0, 0).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
