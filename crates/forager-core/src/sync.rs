use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::ProductError;
use crate::job::{JobItem, JobKind};
use crate::queue::InMemoryJobQueue;
use crate::traits::CatalogStore;

/// Schedules background maintenance of the catalog: image refreshes, link
/// validation sweeps, and full re-scrapes of stale entries.
///
/// Only enqueues work; the worker pool does the actual fetching.
pub struct CatalogSync {
    queue: Arc<InMemoryJobQueue>,
    catalog: Arc<dyn CatalogStore>,
    batch_limit: usize,
}

impl CatalogSync {
    pub fn new(queue: Arc<InMemoryJobQueue>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            queue,
            catalog,
            batch_limit: 100,
        }
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn schedule_image_refresh(
        &self,
        targets: Vec<String>,
        affiliate_tag: Option<String>,
    ) -> Result<Uuid, ProductError> {
        if targets.is_empty() {
            return Err(ProductError::InvalidInput(
                "image refresh needs at least one target".to_string(),
            ));
        }
        let mut job = JobItem::new(JobKind::RefreshImage, targets);
        job.affiliate_tag = affiliate_tag;
        let id = self.queue.enqueue(job)?;
        info!(job_id = %id, "scheduled image refresh");
        Ok(id)
    }

    pub fn schedule_link_validation(&self, urls: Vec<String>) -> Result<Uuid, ProductError> {
        if urls.is_empty() {
            return Err(ProductError::InvalidInput(
                "link validation needs at least one URL".to_string(),
            ));
        }
        let id = self.queue.enqueue(JobItem::new(JobKind::ValidateLink, urls))?;
        info!(job_id = %id, "scheduled link validation");
        Ok(id)
    }

    /// Find catalog entries older than the cutoff and enqueue one bulk
    /// re-scrape covering them. Returns `None` when nothing is stale.
    pub async fn schedule_full_sync(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Option<Uuid>, ProductError> {
        let stale = self
            .catalog
            .stale_entries(older_than, self.batch_limit)
            .await?;
        if stale.is_empty() {
            return Ok(None);
        }
        let count = stale.len();
        let id = self.queue.enqueue(JobItem::new(JobKind::BulkScrape, stale))?;
        info!(job_id = %id, entries = count, "scheduled full catalog sync");
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::testutil::MockCatalog;
    use crate::traits::NullCatalog;

    #[tokio::test]
    async fn full_sync_enqueues_stale_entries() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let catalog = Arc::new(
            MockCatalog::new().with_stale(vec!["B08N5WRWNW".into(), "B07XYZ1234".into()]),
        );
        let sync = CatalogSync::new(queue.clone(), catalog);

        let id = sync
            .schedule_full_sync(Utc::now())
            .await
            .unwrap()
            .unwrap();
        let job = queue.get(id).unwrap().unwrap();
        assert_eq!(job.kind, JobKind::BulkScrape);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.targets.len(), 2);
    }

    #[tokio::test]
    async fn full_sync_with_fresh_catalog_is_a_noop() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let sync = CatalogSync::new(queue.clone(), Arc::new(NullCatalog));

        assert!(sync.schedule_full_sync(Utc::now()).await.unwrap().is_none());
        assert_eq!(queue.stats().unwrap().pending, 0);
    }

    #[test]
    fn empty_target_lists_are_rejected() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let sync = CatalogSync::new(queue, Arc::new(NullCatalog));

        assert!(sync.schedule_image_refresh(vec![], None).is_err());
        assert!(sync.schedule_link_validation(vec![]).is_err());
    }

    #[test]
    fn image_refresh_carries_affiliate_tag() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let sync = CatalogSync::new(queue.clone(), Arc::new(NullCatalog));

        let id = sync
            .schedule_image_refresh(vec!["B08N5WRWNW".into()], Some("site-20".into()))
            .unwrap();
        let job = queue.get(id).unwrap().unwrap();
        assert_eq!(job.affiliate_tag.as_deref(), Some("site-20"));
    }
}
