use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use forager_core::cache::ResultCache;
use forager_core::config::PipelineConfig;
use forager_core::error::ProductError;
use forager_core::health::{AlertRegistry, BacklogThresholds, HealthAggregator};
use forager_core::queue::InMemoryJobQueue;
use forager_core::resolver::Resolver;
use forager_core::sync::CatalogSync;
use forager_core::testutil::MockStrategy;
use forager_core::traits::{AcquisitionStrategy, NullCatalog};
use forager_server::routes;
use forager_server::state::AppState;

pub const TEST_API_KEY: &str = "test-secret-key";

pub struct TestApp {
    pub router: Router,
    pub queue: Arc<InMemoryJobQueue>,
}

/// App with a resolver that always succeeds.
pub fn setup_test_app() -> TestApp {
    build_app(vec![Arc::new(MockStrategy::succeeding("api"))])
}

/// App whose resolver fails every acquisition with a permanent error.
pub fn setup_failing_app() -> TestApp {
    build_app(vec![Arc::new(MockStrategy::failing("api", || {
        ProductError::NotFound("gone".into())
    }))])
}

fn build_app(strategies: Vec<Arc<dyn AcquisitionStrategy>>) -> TestApp {
    let resolver = Arc::new(Resolver::new(strategies, ResultCache::default()));
    let queue = Arc::new(InMemoryJobQueue::default());
    let alerts = Arc::new(AlertRegistry::new());
    let catalog = Arc::new(NullCatalog);

    let health = Arc::new(HealthAggregator::new(
        vec![],
        queue.clone(),
        resolver.metrics(),
        alerts,
        BacklogThresholds::default(),
        Duration::from_millis(200),
        Duration::from_millis(100),
    ));
    let sync = Arc::new(CatalogSync::new(queue.clone(), catalog));

    let mut config = PipelineConfig::default();
    // Keep bulk endpoints fast under test.
    config.pacing = Duration::from_millis(1);

    let state = Arc::new(AppState {
        resolver,
        queue: queue.clone(),
        health,
        sync,
        config,
        api_key: TEST_API_KEY.to_string(),
    });

    TestApp {
        router: routes::router(state),
        queue,
    }
}
