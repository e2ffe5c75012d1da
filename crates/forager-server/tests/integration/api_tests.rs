use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use forager_core::job::{JobItem, JobKind};

use crate::common::{TEST_API_KEY, setup_failing_app, setup_test_app};

fn authed_post(path: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(path)
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn authed_get(path: &str) -> Request<Body> {
    Request::get(path)
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(Request::get("/v1/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(
            Request::get("/v1/jobs")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Bulk scrape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bulk_scrape_resolves_all_items() {
    let app = setup_test_app();

    let body = serde_json::json!({
        "items": [
            {"asin": "B08N5WRWNW"},
            {"url": "https://www.amazon.com/Widget/dp/B07XYZ1234"}
        ],
        "affiliate_tag": "site-20"
    });
    let response = app
        .router
        .oneshot(authed_post("/v1/bulk-scrape", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["products"].as_array().unwrap().len(), 2);
    assert!(json["errors"].as_array().unwrap().is_empty());
    assert!(
        json["products"][0]["affiliate_url"]
            .as_str()
            .unwrap()
            .contains("tag=site-20")
    );
}

#[tokio::test]
async fn bulk_scrape_reports_invalid_asin_as_error_entry() {
    let app = setup_test_app();

    let body = serde_json::json!({"items": [{"asin": "not-an-asin"}]});
    let response = app
        .router
        .oneshot(authed_post("/v1/bulk-scrape", body))
        .await
        .unwrap();

    // Per-item failures come back in the body, not as an HTTP error.
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json["products"].as_array().unwrap().is_empty());
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "INVALID_INPUT");
    assert_eq!(errors[0]["category"], "permanent");
}

#[tokio::test]
async fn bulk_scrape_mixes_successes_and_failures() {
    let app = setup_failing_app();

    let body = serde_json::json!({"items": [{"asin": "B08N5WRWNW"}]});
    let response = app
        .router
        .oneshot(authed_post("/v1/bulk-scrape", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["errors"][0]["code"], "NOT_FOUND");
    assert_eq!(json["errors"][0]["asin"], "B08N5WRWNW");
}

#[tokio::test]
async fn bulk_scrape_rejects_empty_items() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(authed_post("/v1/bulk-scrape", serde_json::json!({"items": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "validation_error");
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bulk_refresh_enqueues_job_and_job_is_retrievable() {
    let app = setup_test_app();

    let body = serde_json::json!({
        "targets": ["B08N5WRWNW", "B07XYZ1234"],
        "action": "refresh_image",
    });
    let response = app
        .router
        .clone()
        .oneshot(authed_post("/v1/bulk-refresh", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "pending");
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let response = app
        .router
        .oneshot(authed_get(&format!("/v1/jobs/{job_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "refresh_image");
    assert_eq!(json["targets"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn bulk_refresh_rejects_empty_targets() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(authed_post(
            "/v1/bulk-refresh",
            serde_json::json!({"targets": [], "action": "refresh_image"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_refresh_schedules_link_validation() {
    let app = setup_test_app();

    let body = serde_json::json!({
        "targets": ["https://www.amazon.com/dp/B08N5WRWNW"],
        "action": "validate_link",
    });
    let response = app
        .router
        .clone()
        .oneshot(authed_post("/v1/bulk-refresh", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let response = app
        .router
        .oneshot(authed_get(&format!("/v1/jobs/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "validate_link");
}

#[tokio::test]
async fn bulk_refresh_rejects_unknown_action() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(authed_post(
            "/v1/bulk-refresh",
            serde_json::json!({"targets": ["B08N5WRWNW"], "action": "reindex"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(authed_get(
            "/v1/jobs/00000000-0000-0000-0000-000000000000",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let app = setup_test_app();
    app.queue
        .enqueue(JobItem::new(JobKind::ValidateLink, vec!["https://a".into()]))
        .unwrap();
    let done = app
        .queue
        .enqueue(JobItem::new(JobKind::RefreshImage, vec!["B08N5WRWNW".into()]))
        .unwrap();
    app.queue.claim_next().unwrap();
    app.queue.complete(done, 1, 0).unwrap();

    let response = app
        .router
        .oneshot(authed_get("/v1/jobs?status=succeeded"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["jobs"][0]["status"], "succeeded");
    assert_eq!(json["jobs"][0]["succeeded"], 1);
    assert_eq!(json["jobs"][0]["failed"], 0);
}

#[tokio::test]
async fn job_stats_reports_counters() {
    let app = setup_test_app();
    app.queue
        .enqueue(JobItem::new(JobKind::BulkScrape, vec!["B08N5WRWNW".into()]))
        .unwrap();

    let response = app
        .router
        .oneshot(authed_get("/v1/jobs/stats"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["pending"], 1);
    assert_eq!(json["backlog"], 1);
}

// ---------------------------------------------------------------------------
// System health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn system_health_is_200_when_healthy() {
    let app = setup_test_app();

    let response = app
        .router
        .oneshot(authed_get("/v1/system-health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["queue"]["backlog"], 0);
    assert!(json["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn system_health_is_503_under_heavy_backlog() {
    let app = setup_test_app();
    for _ in 0..600 {
        app.queue
            .enqueue(JobItem::new(JobKind::RefreshImage, vec!["B08N5WRWNW".into()]))
            .unwrap();
    }

    let response = app
        .router
        .oneshot(authed_get("/v1/system-health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = json_body(response).await;
    assert_eq!(json["status"], "unhealthy");
}

#[tokio::test]
async fn system_health_is_207_at_moderate_backlog() {
    let app = setup_test_app();
    for _ in 0..150 {
        app.queue
            .enqueue(JobItem::new(JobKind::ValidateLink, vec!["https://a".into()]))
            .unwrap();
    }

    let response = app
        .router
        .oneshot(authed_get("/v1/system-health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let json = json_body(response).await;
    assert_eq!(json["status"], "degraded");
}
