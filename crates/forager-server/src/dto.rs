use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forager_core::error::ClassifiedError;
use forager_core::health::{Alert, ComponentReport, HealthSnapshot};
use forager_core::job::{JobItem, QueueStats};
use forager_core::product::{FailureReport, ProductData};

// ---------------------------------------------------------------------------
// Bulk scrape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BulkScrapeRequest {
    /// Products to resolve; each item needs an ASIN or a product URL.
    pub items: Vec<BulkScrapeItem>,
    /// Affiliate tag to stamp on every returned link (falls back to
    /// FORAGER_AFFILIATE_TAG).
    pub affiliate_tag: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BulkScrapeItem {
    pub asin: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductResponse {
    pub asin: String,
    pub title: String,
    pub price: Option<String>,
    pub brand: Option<String>,
    pub features: Vec<String>,
    pub image_url: Option<String>,
    pub source_url: String,
    pub affiliate_url: String,
    pub acquired_via: String,
}

impl From<ProductData> for ProductResponse {
    fn from(p: ProductData) -> Self {
        Self {
            asin: p.asin,
            title: p.title,
            price: p.price,
            brand: p.brand,
            features: p.features,
            image_url: p.image_url,
            source_url: p.source_url,
            affiliate_url: p.affiliate_url,
            acquired_via: p.acquired_via.to_string(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScrapeErrorResponse {
    pub asin: String,
    pub code: String,
    pub category: String,
    pub message: String,
    pub retryable: bool,
}

impl From<FailureReport> for ScrapeErrorResponse {
    fn from(report: FailureReport) -> Self {
        Self {
            asin: report.asin,
            code: report.error.code,
            category: format!("{:?}", report.error.category).to_lowercase(),
            message: report.error.message,
            retryable: report.error.retryable,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BulkScrapeResponse {
    /// True only when every requested item resolved.
    pub success: bool,
    pub products: Vec<ProductResponse>,
    pub errors: Vec<ScrapeErrorResponse>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Bulk refresh / jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BulkRefreshRequest {
    /// ASINs (or product URLs) the job should operate on.
    pub targets: Vec<String>,
    /// What the enqueued job does: `refresh_image` or `validate_link`.
    pub action: String,
    pub affiliate_tag: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BulkRefreshResponse {
    pub job_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub kind: String,
    pub status: String,
    pub targets: Vec<String>,
    pub attempt: u32,
    /// Per-target outcome tallies, populated once the job is terminal.
    pub succeeded: u32,
    pub failed: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub error: Option<JobErrorResponse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobErrorResponse {
    pub code: String,
    pub category: String,
    pub message: String,
    pub retryable: bool,
}

impl From<ClassifiedError> for JobErrorResponse {
    fn from(e: ClassifiedError) -> Self {
        Self {
            code: e.code,
            category: format!("{:?}", e.category).to_lowercase(),
            message: e.message,
            retryable: e.retryable,
        }
    }
}

impl From<JobItem> for JobResponse {
    fn from(job: JobItem) -> Self {
        Self {
            id: job.id,
            kind: job.kind.to_string(),
            status: job.status.to_string(),
            targets: job.targets,
            attempt: job.attempt,
            succeeded: job.succeeded,
            failed: job.failed,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            not_before: job.not_before,
            error: job.error.map(JobErrorResponse::from),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QueueStatsResponse {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub backlog: usize,
}

impl From<QueueStats> for QueueStatsResponse {
    fn from(s: QueueStats) -> Self {
        Self {
            pending: s.pending,
            running: s.running,
            succeeded: s.succeeded,
            failed: s.failed,
            backlog: s.backlog(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ComponentResponse {
    pub component: String,
    pub status: String,
    pub response_time_ms: Option<u64>,
    pub detail: Option<String>,
}

impl From<ComponentReport> for ComponentResponse {
    fn from(r: ComponentReport) -> Self {
        Self {
            component: r.component,
            status: format!("{:?}", r.status).to_lowercase(),
            response_time_ms: r.response_time_ms,
            detail: r.detail,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AlertResponse {
    pub id: Uuid,
    pub code: String,
    pub message: String,
    pub critical: bool,
    pub raised_at: DateTime<Utc>,
}

impl From<Alert> for AlertResponse {
    fn from(a: Alert) -> Self {
        Self {
            id: a.id,
            code: a.code,
            message: a.message,
            critical: a.critical,
            raised_at: a.raised_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SystemHealthResponse {
    pub status: String,
    pub components: Vec<ComponentResponse>,
    pub queue: QueueStatsResponse,
    pub alerts: Vec<AlertResponse>,
    pub checked_at: DateTime<Utc>,
}

impl From<HealthSnapshot> for SystemHealthResponse {
    fn from(s: HealthSnapshot) -> Self {
        Self {
            status: format!("{:?}", s.status).to_lowercase(),
            components: s.components.into_iter().map(ComponentResponse::from).collect(),
            queue: s.queue.into(),
            alerts: s.alerts.into_iter().map(AlertResponse::from).collect(),
            checked_at: s.checked_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
