use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chrono::Utc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use forager_core::asin::Asin;
use forager_core::error::{ProductError, classify};
use forager_core::job::JobStatus;
use forager_core::product::{AcquisitionOutcome, AcquisitionRequest, FailureReport};

use crate::auth::require_api_key;
use crate::dto::{
    BulkRefreshRequest, BulkRefreshResponse, BulkScrapeRequest, BulkScrapeResponse, ErrorResponse,
    HealthResponse, JobListResponse, JobResponse, ListJobsQuery, ProductResponse,
    QueueStatsResponse, ScrapeErrorResponse, SystemHealthResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/bulk-scrape", post(bulk_scrape))
        .route("/v1/bulk-refresh", post(bulk_refresh))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/jobs/stats", get(job_stats))
        .route("/v1/jobs/{id}", get(get_job))
        .route("/v1/system-health", get(system_health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

// ---------------------------------------------------------------------------
// Bulk scrape
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/bulk-scrape",
    request_body = BulkScrapeRequest,
    responses(
        (status = 200, description = "Per-item results; failures are listed, not raised", body = BulkScrapeResponse),
        (status = 400, description = "Empty item list", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "products"
)]
pub async fn bulk_scrape(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<BulkScrapeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.items.is_empty() {
        return Err(ProductError::InvalidInput("items must not be empty".to_string()).into());
    }

    let tag = body
        .affiliate_tag
        .or_else(|| state.config.affiliate_tag.clone());

    let mut products = Vec::new();
    let mut errors = Vec::new();

    for (index, item) in body.items.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(state.config.pacing).await;
        }

        let request = match build_request(item.asin.as_deref(), item.url.as_deref(), tag.as_deref())
        {
            Ok(request) => request,
            Err(err) => {
                errors.push(ScrapeErrorResponse::from(FailureReport {
                    error: classify(&err),
                    asin: item.asin.clone().unwrap_or_default(),
                }));
                continue;
            }
        };

        match state.resolver.resolve(&request).await {
            AcquisitionOutcome::Success(product) => products.push(ProductResponse::from(product)),
            AcquisitionOutcome::Failure(report) => {
                errors.push(ScrapeErrorResponse::from(report));
            }
        }
    }

    Ok(axum::Json(BulkScrapeResponse {
        success: errors.is_empty(),
        products,
        errors,
        timestamp: Utc::now(),
    }))
}

fn build_request(
    asin: Option<&str>,
    url: Option<&str>,
    tag: Option<&str>,
) -> Result<AcquisitionRequest, ProductError> {
    let mut request = match (asin, url) {
        (Some(asin), _) => AcquisitionRequest::for_asin(Asin::parse(asin)?),
        (None, Some(url)) => AcquisitionRequest::for_url(url),
        (None, None) => {
            return Err(ProductError::InvalidInput(
                "item needs an asin or a url".to_string(),
            ));
        }
    };
    if let (Some(url), None) = (url, &request.url) {
        request.url = Some(url.to_string());
    }
    request.affiliate_tag = tag.map(str::to_string);
    Ok(request)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/bulk-refresh",
    request_body = BulkRefreshRequest,
    responses(
        (status = 202, description = "Refresh job enqueued", body = BulkRefreshResponse),
        (status = 400, description = "Empty target list or unknown action", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn bulk_refresh(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<BulkRefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = match body.action.as_str() {
        "refresh_image" => {
            let tag = body
                .affiliate_tag
                .or_else(|| state.config.affiliate_tag.clone());
            state.sync.schedule_image_refresh(body.targets, tag)?
        }
        "validate_link" => state.sync.schedule_link_validation(body.targets)?,
        other => {
            return Err(ProductError::InvalidInput(format!("unknown action: {other}")).into());
        }
    };

    let response = BulkRefreshResponse {
        job_id,
        status: JobStatus::Pending.to_string(),
    };
    Ok((StatusCode::ACCEPTED, axum::Json(response)))
}

#[utoipa::path(
    get,
    path = "/v1/jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "List of jobs", body = JobListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = query.status.map(|s| s.parse::<JobStatus>()).transpose()?;

    let limit = query.limit.unwrap_or(20).min(100);
    let jobs = state.queue.list(status_filter, limit)?;
    let total = jobs.len();

    let response = JobListResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
    };
    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/v1/jobs/stats",
    responses(
        (status = 200, description = "Queue counters", body = QueueStatsResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn job_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.queue.stats()?;
    Ok(axum::Json(QueueStatsResponse::from(stats)))
}

#[utoipa::path(
    get,
    path = "/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job details", body = JobResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.queue.get(id)? {
        Some(job) => Ok(axum::Json(JobResponse::from(job)).into_response()),
        None => {
            let body = ErrorResponse {
                error: "not_found".to_string(),
                message: format!("Job not found: {id}"),
            };
            Ok((StatusCode::NOT_FOUND, axum::Json(body)).into_response())
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/system-health",
    responses(
        (status = 200, description = "All components healthy", body = SystemHealthResponse),
        (status = 207, description = "Degraded", body = SystemHealthResponse),
        (status = 503, description = "Unhealthy", body = SystemHealthResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "system"
)]
pub async fn system_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    use forager_core::health::ComponentStatus;

    let snapshot = state.health.snapshot().await;
    let status = match snapshot.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::MULTI_STATUS,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, axum::Json(SystemHealthResponse::from(snapshot)))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health() -> impl IntoResponse {
    axum::Json(HealthResponse { status: "healthy" })
}
