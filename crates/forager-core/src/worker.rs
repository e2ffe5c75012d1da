use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ClassifiedError, ProductError, classify};
use crate::health::AlertRegistry;
use crate::job::{JobItem, JobKind};
use crate::product::{AcquisitionOutcome, AcquisitionRequest};
use crate::queue::InMemoryJobQueue;
use crate::resolver::Resolver;
use crate::traits::{CatalogStore, LinkProbe};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a JobItem,
    },
    JobCompleted {
        job_id: Uuid,
        targets: usize,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        retry_id: Option<Uuid>,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(job_id = %job.id, kind = %job.kind, targets = job.targets.len(), "Job claimed");
            }
            WorkerEvent::JobCompleted { job_id, targets } => {
                tracing::info!(%job_id, %targets, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                retry_id,
            } => {
                tracing::warn!(%job_id, %error, ?retry_id, "Job failed");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    /// Delay inserted between consecutive targets of one job, keeping the
    /// upstream request rate polite.
    pub pacing: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(2),
            pacing: Duration::from_millis(200),
        }
    }
}

/// Worker that polls the job queue and processes pipeline jobs.
///
/// A job succeeds only when every target succeeds; the first failure's
/// classification becomes the job error. Retry scheduling is the queue's
/// concern, alert raising happens here.
#[derive(Clone)]
pub struct WorkerService {
    queue: Arc<InMemoryJobQueue>,
    resolver: Arc<Resolver>,
    link_probe: Arc<dyn LinkProbe>,
    catalog: Arc<dyn CatalogStore>,
    alerts: Arc<AlertRegistry>,
    config: WorkerConfig,
}

impl WorkerService {
    pub fn new(
        queue: Arc<InMemoryJobQueue>,
        resolver: Arc<Resolver>,
        link_probe: Arc<dyn LinkProbe>,
        catalog: Arc<dyn CatalogStore>,
        alerts: Arc<AlertRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            resolver,
            link_probe,
            catalog,
            alerts,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(&self, cancel_token: CancellationToken, reporter: &WR) {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.queue.claim_next() {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, &cancel_token, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });
    }

    pub async fn process_job<WR: WorkerReporter>(
        &self,
        job: &JobItem,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) {
        let mut first_error: Option<ClassifiedError> = None;
        let mut succeeded: u32 = 0;
        let mut failed: u32 = 0;
        let mut interrupted = false;

        for (index, target) in job.targets.iter().enumerate() {
            if cancel_token.is_cancelled() {
                interrupted = true;
                break;
            }
            if index > 0 {
                tokio::select! {
                    () = tokio::time::sleep(self.config.pacing) => {}
                    () = cancel_token.cancelled() => {
                        interrupted = true;
                        break;
                    }
                }
            }

            let result = match job.kind {
                JobKind::RefreshImage => self.refresh_target(target, job).await,
                JobKind::BulkScrape => self.scrape_target(target, job).await,
                JobKind::ValidateLink => self.validate_target(target).await,
            };

            match result {
                Ok(()) => succeeded += 1,
                Err(error) => {
                    failed += 1;
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        // A shutdown-interrupted job has unprocessed targets and must not be
        // recorded as a success. Fail it with a retryable system error so a
        // fresh item carries the remaining work; no alert, this is routine.
        if interrupted {
            let error = classify(&ProductError::System(
                "worker shut down before the job finished".to_string(),
            ));
            match self.queue.fail(job.id, error.clone(), succeeded, failed) {
                Ok(retry_id) => reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error.message,
                    retry_id,
                }),
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to park interrupted job");
                }
            }
            return;
        }

        match first_error {
            None => {
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    targets: job.targets.len(),
                });
                if let Err(e) = self.queue.complete(job.id, succeeded, failed) {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job succeeded");
                }
            }
            Some(error) => {
                if self.queue.policy().should_notify(&error) {
                    self.alerts.raise(&error);
                }
                match self.queue.fail(job.id, error.clone(), succeeded, failed) {
                    Ok(retry_id) => reporter.report(WorkerEvent::JobFailed {
                        job_id: job.id,
                        error: &error.message,
                        retry_id,
                    }),
                    Err(e) => {
                        tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                    }
                }
            }
        }
    }

    fn request_for(&self, target: &str, job: &JobItem) -> AcquisitionRequest {
        let mut request = match target.parse() {
            Ok(asin) => AcquisitionRequest::for_asin(asin),
            Err(_) => AcquisitionRequest::for_url(target),
        };
        request.affiliate_tag = job.affiliate_tag.clone();
        request
    }

    async fn refresh_target(&self, target: &str, job: &JobItem) -> Result<(), ClassifiedError> {
        let request = self.request_for(target, job);
        match self.resolver.refresh(&request).await {
            AcquisitionOutcome::Success(product) => {
                if let Err(e) = self.catalog.upsert(&product).await {
                    return Err(classify(&e).with_context(format!("upserting {target}")));
                }
                Ok(())
            }
            AcquisitionOutcome::Failure(report) => Err(report.error),
        }
    }

    async fn scrape_target(&self, target: &str, job: &JobItem) -> Result<(), ClassifiedError> {
        let request = self.request_for(target, job);
        match self.resolver.resolve(&request).await {
            AcquisitionOutcome::Success(product) => {
                if let Err(e) = self.catalog.upsert(&product).await {
                    return Err(classify(&e).with_context(format!("upserting {target}")));
                }
                Ok(())
            }
            AcquisitionOutcome::Failure(report) => Err(report.error),
        }
    }

    async fn validate_target(&self, url: &str) -> Result<(), ClassifiedError> {
        let check = match self.link_probe.check(url).await {
            Ok(check) => check,
            Err(e) => return Err(classify(&e).with_context(format!("probing {url}"))),
        };
        if let Err(e) = self.catalog.record_link_check(&check).await {
            return Err(classify(&e).with_context(format!("recording check for {url}")));
        }
        if !check.valid {
            return Err(classify(&ProductError::LinkValidation(format!(
                "{url} returned HTTP {}",
                check.status_code
            ))));
        }
        Ok(())
    }
}

/// Spawns `count` worker loops sharing one cancellation token.
pub struct WorkerPool {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(service: &WorkerService, count: usize, cancel_token: &CancellationToken) -> Self {
        let handles = (0..count)
            .map(|n| {
                let mut service = service.clone();
                service.config.worker_id = format!("{}-{n}", service.config.worker_id);
                let token = cancel_token.clone();
                tokio::spawn(async move {
                    service.run(token, &TracingWorkerReporter).await;
                })
            })
            .collect();
        Self { handles }
    }

    /// Wait for every worker to observe cancellation and exit.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResultCache;
    use crate::error::ErrorCategory;
    use crate::job::JobStatus;
    use crate::resolver::PlaceholderStrategy;
    use crate::testutil::{MockCatalog, MockLinkProbe, MockStrategy, NullReporter};

    fn service(
        queue: Arc<InMemoryJobQueue>,
        resolver: Resolver,
        link_probe: Arc<dyn LinkProbe>,
        catalog: Arc<MockCatalog>,
        alerts: Arc<AlertRegistry>,
    ) -> WorkerService {
        WorkerService::new(
            queue,
            Arc::new(resolver),
            link_probe,
            catalog,
            alerts,
            WorkerConfig {
                worker_id: "test-worker".into(),
                poll_interval: Duration::from_millis(10),
                pacing: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn refresh_job_upserts_and_completes() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let catalog = Arc::new(MockCatalog::new());
        let svc = service(
            queue.clone(),
            Resolver::new(vec![Arc::new(PlaceholderStrategy)], ResultCache::default()),
            Arc::new(MockLinkProbe::valid()),
            catalog.clone(),
            Arc::new(AlertRegistry::new()),
        );

        let id = queue
            .enqueue_new(JobKind::RefreshImage, vec!["B08N5WRWNW".into(), "B07XYZ1234".into()])
            .unwrap();
        let job = queue.claim_next().unwrap().unwrap();
        svc.process_job(&job, &CancellationToken::new(), &NullReporter)
            .await;

        let item = queue.get(id).unwrap().unwrap();
        assert_eq!(item.status, JobStatus::Succeeded);
        assert_eq!(item.succeeded, 2);
        assert_eq!(item.failed, 0);
        assert_eq!(catalog.upserted().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_job_is_not_marked_succeeded() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let catalog = Arc::new(MockCatalog::new());
        let alerts = Arc::new(AlertRegistry::new());
        let svc = service(
            queue.clone(),
            Resolver::new(vec![Arc::new(PlaceholderStrategy)], ResultCache::default()),
            Arc::new(MockLinkProbe::valid()),
            catalog.clone(),
            alerts.clone(),
        );

        let id = queue
            .enqueue_new(JobKind::RefreshImage, vec!["B08N5WRWNW".into(), "B07XYZ1234".into()])
            .unwrap();
        let job = queue.claim_next().unwrap().unwrap();

        let token = CancellationToken::new();
        token.cancel();
        svc.process_job(&job, &token, &NullReporter).await;

        // Nothing was processed and nothing pretends it was.
        assert!(catalog.upserted().is_empty());
        let item = queue.get(id).unwrap().unwrap();
        assert_eq!(item.status, JobStatus::Failed);
        assert_eq!(item.succeeded, 0);
        // The remaining work respawned as a retryable item.
        assert_eq!(queue.stats().unwrap().pending, 1);
        // Shutdown is not an operator incident.
        assert!(alerts.active().is_empty());
    }

    #[tokio::test]
    async fn failing_target_fails_job_with_first_error() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let svc = service(
            queue.clone(),
            Resolver::new(
                vec![Arc::new(MockStrategy::failing("api", || {
                    ProductError::Network("refused".into())
                }))],
                ResultCache::default(),
            ),
            Arc::new(MockLinkProbe::valid()),
            Arc::new(MockCatalog::new()),
            Arc::new(AlertRegistry::new()),
        );

        let id = queue
            .enqueue_new(JobKind::BulkScrape, vec!["B08N5WRWNW".into()])
            .unwrap();
        let job = queue.claim_next().unwrap().unwrap();
        svc.process_job(&job, &CancellationToken::new(), &NullReporter)
            .await;

        let failed = queue.get(id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_ref().unwrap().code, "NETWORK_ERROR");
        assert_eq!(failed.failed, 1);
        assert_eq!(failed.succeeded, 0);
        // Retryable failure spawned a fresh pending item.
        assert_eq!(queue.stats().unwrap().pending, 1);
    }

    #[tokio::test]
    async fn broken_link_fails_validation_and_raises_alert() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let catalog = Arc::new(MockCatalog::new());
        let alerts = Arc::new(AlertRegistry::new());
        let svc = service(
            queue.clone(),
            Resolver::new(vec![Arc::new(PlaceholderStrategy)], ResultCache::default()),
            Arc::new(MockLinkProbe::broken(404)),
            catalog.clone(),
            alerts.clone(),
        );

        let id = queue
            .enqueue_new(JobKind::ValidateLink, vec!["https://example.com/dead".into()])
            .unwrap();
        let job = queue.claim_next().unwrap().unwrap();
        svc.process_job(&job, &CancellationToken::new(), &NullReporter)
            .await;

        let failed = queue.get(id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        let error = failed.error.unwrap();
        assert_eq!(error.code, "LINK_VALIDATION_ERROR");
        assert_eq!(error.category, ErrorCategory::Permanent);
        // The check was still recorded before the job was failed.
        assert_eq!(catalog.link_checks().len(), 1);
        // Permanent failures surface to operators.
        assert_eq!(alerts.active().len(), 1);
        // And never respawn.
        assert_eq!(queue.stats().unwrap().pending, 0);
    }

    #[tokio::test]
    async fn worker_loop_drains_queue_and_stops_on_cancel() {
        let queue = Arc::new(InMemoryJobQueue::default());
        let catalog = Arc::new(MockCatalog::new());
        let svc = service(
            queue.clone(),
            Resolver::new(vec![Arc::new(PlaceholderStrategy)], ResultCache::default()),
            Arc::new(MockLinkProbe::valid()),
            catalog.clone(),
            Arc::new(AlertRegistry::new()),
        );
        queue
            .enqueue_new(JobKind::RefreshImage, vec!["B08N5WRWNW".into()])
            .unwrap();

        let token = CancellationToken::new();
        let run_token = token.clone();
        let handle = tokio::spawn(async move {
            svc.run(run_token, &NullReporter).await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(queue.stats().unwrap().succeeded, 1);
        assert_eq!(catalog.upserted().len(), 1);
    }
}
