use std::sync::Arc;

use forager_core::config::PipelineConfig;
use forager_core::health::HealthAggregator;
use forager_core::queue::InMemoryJobQueue;
use forager_core::resolver::Resolver;
use forager_core::sync::CatalogSync;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub queue: Arc<InMemoryJobQueue>,
    pub health: Arc<HealthAggregator>,
    pub sync: Arc<CatalogSync>,
    pub config: PipelineConfig,
    /// API key for protecting the `/v1` endpoints.
    pub api_key: String,
}
