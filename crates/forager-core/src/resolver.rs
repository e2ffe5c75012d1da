use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::asin::{Asin, with_affiliate_tag};
use crate::cache::ResultCache;
use crate::error::{ProductError, classify};
use crate::product::{
    AcquiredVia, AcquisitionOutcome, AcquisitionRequest, FailureReport, ProductData,
};
use crate::traits::AcquisitionStrategy;

/// Rolling counters over resolver activity.
///
/// `record_*` is called once per terminal outcome, not per strategy attempt,
/// so the error rate reflects what callers actually saw.
#[derive(Debug, Default)]
pub struct ResolverMetrics {
    attempts: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
}

impl ResolverMetrics {
    pub fn record_success(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        MetricsSnapshot {
            attempts,
            failures,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            error_rate: if attempts == 0 {
                0.0
            } else {
                failures as f64 / attempts as f64
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub error_rate: f64,
}

/// Multi-strategy product resolver.
///
/// Tries each strategy in chain order until one succeeds; the outcome
/// (success or classified failure) is cached either way. A request never
/// escapes as an `Err`: invalid input, exhausted strategies, everything
/// comes back as an [`AcquisitionOutcome`].
pub struct Resolver {
    strategies: Vec<Arc<dyn AcquisitionStrategy>>,
    cache: ResultCache,
    metrics: Arc<ResolverMetrics>,
}

impl Resolver {
    pub fn new(strategies: Vec<Arc<dyn AcquisitionStrategy>>, cache: ResultCache) -> Self {
        Self {
            strategies,
            cache,
            metrics: Arc::new(ResolverMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<ResolverMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn resolve(&self, request: &AcquisitionRequest) -> AcquisitionOutcome {
        let request = normalize(request);

        let Some(key) = request.lookup_key() else {
            let error = classify(&ProductError::InvalidInput(
                "request has neither an ASIN nor a URL".to_string(),
            ));
            return AcquisitionOutcome::Failure(FailureReport {
                error,
                asin: String::new(),
            });
        };

        if let Some(cached) = self.cache.get(&key).await {
            debug!(key = %key, hit = cached.is_success(), "cache hit");
            self.metrics.record_cache_hit();
            return cached;
        }

        let outcome = self.run_chain(&request, &key).await;
        self.cache.put(&key, outcome.clone()).await;
        outcome
    }

    /// Bypass the cache, resolve fresh, and overwrite the cached entry.
    pub async fn refresh(&self, request: &AcquisitionRequest) -> AcquisitionOutcome {
        let request = normalize(request);
        let Some(key) = request.lookup_key() else {
            return self.resolve(&request).await;
        };
        self.cache.invalidate(&key).await;
        let outcome = self.run_chain(&request, &key).await;
        self.cache.put(&key, outcome.clone()).await;
        outcome
    }

    async fn run_chain(&self, request: &AcquisitionRequest, key: &str) -> AcquisitionOutcome {
        let mut last_error: Option<ProductError> = None;

        for strategy in &self.strategies {
            match strategy.acquire(request).await {
                Ok(mut product) => {
                    if let Some(tag) = request.affiliate_tag.as_deref() {
                        product.affiliate_url = with_affiliate_tag(&product.affiliate_url, Some(tag));
                    }
                    info!(
                        key = %key,
                        strategy = strategy.name(),
                        acquired_via = %product.acquired_via,
                        "product resolved"
                    );
                    self.metrics.record_success();
                    return AcquisitionOutcome::Success(product);
                }
                Err(err) => {
                    warn!(
                        key = %key,
                        strategy = strategy.name(),
                        kind = %strategy.kind(),
                        error = %err,
                        "strategy failed, falling through"
                    );
                    last_error = Some(err);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            ProductError::Config("resolver has no strategies configured".to_string())
        });
        let classified = classify(&error).with_context(format!("lookup key {key}"));
        warn!(key = %key, code = %classified.code, "all strategies exhausted");
        self.metrics.record_failure();

        AcquisitionOutcome::Failure(FailureReport {
            error: classified,
            asin: request
                .asin
                .as_ref()
                .map(|a| a.as_str().to_string())
                .unwrap_or_default(),
        })
    }
}

/// Fill in the ASIN from the URL when the caller only supplied a URL.
fn normalize(request: &AcquisitionRequest) -> AcquisitionRequest {
    let mut request = request.clone();
    if request.asin.is_none()
        && let Some(url) = request.url.as_deref()
    {
        request.asin = Asin::from_url(url);
    }
    request
}

/// Terminal rung of the chain: synthesizes a minimal product from whatever
/// the request carries. An ASIN yields the deterministic image URL; a bare
/// URL falls back to a stock placeholder image so the item stays
/// displayable either way.
#[derive(Debug, Clone)]
pub struct PlaceholderStrategy;

#[async_trait]
impl AcquisitionStrategy for PlaceholderStrategy {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn kind(&self) -> AcquiredVia {
        AcquiredVia::Placeholder
    }

    async fn acquire(&self, request: &AcquisitionRequest) -> Result<ProductData, ProductError> {
        if let Some(asin) = request.asin.as_ref() {
            return Ok(ProductData::placeholder(asin, request.affiliate_tag.as_deref()));
        }
        let url = request.url.as_deref().ok_or_else(|| {
            ProductError::InvalidInput("placeholder requires an ASIN or a URL".to_string())
        })?;
        Ok(ProductData::placeholder_for_url(url, request.affiliate_tag.as_deref()))
    }
}
