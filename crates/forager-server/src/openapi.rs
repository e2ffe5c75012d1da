use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Forager API",
        version = "0.2.0",
        description = "Resilient affiliate product pipeline: multi-strategy acquisition, \
                       background refresh jobs, and system health."
    ),
    paths(
        crate::routes::bulk_scrape,
        crate::routes::bulk_refresh,
        crate::routes::list_jobs,
        crate::routes::job_stats,
        crate::routes::get_job,
        crate::routes::system_health,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::BulkScrapeRequest,
        crate::dto::BulkScrapeItem,
        crate::dto::BulkScrapeResponse,
        crate::dto::ProductResponse,
        crate::dto::ScrapeErrorResponse,
        crate::dto::BulkRefreshRequest,
        crate::dto::BulkRefreshResponse,
        crate::dto::JobResponse,
        crate::dto::JobErrorResponse,
        crate::dto::JobListResponse,
        crate::dto::QueueStatsResponse,
        crate::dto::SystemHealthResponse,
        crate::dto::ComponentResponse,
        crate::dto::AlertResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "products", description = "Product acquisition"),
        (name = "jobs", description = "Background job management"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the Bearer token security scheme to the OpenAPI document.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "API key. Set via FORAGER_API_KEY environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
