use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use forager_client::{HttpLinkProbe, MarketplaceApi, PaapiConfig, PageScraper};
use forager_core::cache::ResultCache;
use forager_core::config::PipelineConfig;
use forager_core::health::{AlertRegistry, HealthAggregator};
use forager_core::queue::InMemoryJobQueue;
use forager_core::resolver::{PlaceholderStrategy, Resolver};
use forager_core::sync::CatalogSync;
use forager_core::traits::{AcquisitionStrategy, ComponentProbe, NullCatalog};
use forager_core::worker::{WorkerConfig, WorkerPool, WorkerService};
use forager_server::routes;
use forager_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("forager=info".parse()?))
        .with_target(false)
        .init();

    let api_key = std::env::var("FORAGER_API_KEY").context("FORAGER_API_KEY must be set")?;
    let port = std::env::var("FORAGER_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let config = PipelineConfig::from_env()?;

    // Acquisition chain, best source first.
    let mut strategies: Vec<Arc<dyn AcquisitionStrategy>> = Vec::new();
    let mut probes: Vec<Arc<dyn ComponentProbe>> = Vec::new();

    match PaapiConfig::from_env()? {
        Some(paapi_config) => {
            let api = Arc::new(MarketplaceApi::new(paapi_config, config.fetch_timeout)?);
            strategies.push(api.clone());
            probes.push(api);
        }
        None => tracing::info!("No marketplace API credentials, starting with scraper only"),
    }

    strategies.push(Arc::new(PageScraper::new(config.fetch_timeout)?));

    #[cfg(feature = "browser")]
    if config.enable_screenshots {
        let dir = std::env::var("FORAGER_SCREENSHOT_DIR")
            .unwrap_or_else(|_| "screenshots".to_string());
        let capture = forager_client::ScreenshotCapture::new(
            dir.into(),
            std::time::Duration::from_secs(30),
        )
        .await?;
        strategies.push(Arc::new(capture));
    }

    strategies.push(Arc::new(PlaceholderStrategy));

    let cache = ResultCache::new(config.cache_ttl, config.failure_ttl);
    let resolver = Arc::new(Resolver::new(strategies, cache));
    let metrics = resolver.metrics();

    let queue = Arc::new(InMemoryJobQueue::default());
    let alerts = Arc::new(AlertRegistry::new());
    let catalog = Arc::new(NullCatalog);

    let worker = WorkerService::new(
        queue.clone(),
        resolver.clone(),
        Arc::new(HttpLinkProbe::new()?),
        catalog.clone(),
        alerts.clone(),
        WorkerConfig {
            pacing: config.pacing,
            poll_interval: config.poll_interval,
            ..WorkerConfig::default()
        },
    );
    let cancel_token = CancellationToken::new();
    let pool = WorkerPool::spawn(&worker, config.workers, &cancel_token);

    let health = Arc::new(HealthAggregator::new(
        probes,
        queue.clone(),
        metrics,
        alerts,
        config.backlog,
        config.probe_timeout,
        config.probe_slow_after,
    ));
    let sync = Arc::new(CatalogSync::new(queue.clone(), catalog));

    let state = Arc::new(AppState {
        resolver,
        queue,
        health,
        sync,
        config,
        api_key,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel_token.cancel();
    pool.join().await;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to install CTRL+C handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
