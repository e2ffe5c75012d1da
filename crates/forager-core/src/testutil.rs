//! Test doubles for the pipeline's trait seams.
//!
//! Used by this crate's unit tests and by downstream integration tests, so
//! they live in the library rather than behind `#[cfg(test)]`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProductError;
use crate::product::{AcquiredVia, AcquisitionRequest, LinkCheck, ProductData};
use crate::traits::{AcquisitionStrategy, CatalogStore, ComponentProbe, LinkProbe};
use crate::worker::WorkerReporter;

type ErrorFactory = Box<dyn Fn() -> ProductError + Send + Sync>;

enum MockBehavior {
    Succeed,
    Fail(ErrorFactory),
}

/// Scripted acquisition strategy that counts its invocations.
pub struct MockStrategy {
    name: &'static str,
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockStrategy {
    pub fn succeeding(name: &'static str) -> Self {
        Self {
            name,
            behavior: MockBehavior::Succeed,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(
        name: &'static str,
        error: impl Fn() -> ProductError + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            behavior: MockBehavior::Fail(Box::new(error)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AcquisitionStrategy for MockStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> AcquiredVia {
        AcquiredVia::StructuredApi
    }

    async fn acquire(&self, request: &AcquisitionRequest) -> Result<ProductData, ProductError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Fail(factory) => Err(factory()),
            MockBehavior::Succeed => {
                let asin = request
                    .asin
                    .as_ref()
                    .map(|a| a.as_str().to_string())
                    .unwrap_or_else(|| "B000TEST00".to_string());
                let source_url = request
                    .product_url()
                    .unwrap_or_else(|| format!("https://www.amazon.com/dp/{asin}"));
                Ok(ProductData {
                    asin,
                    title: "Mock Product".to_string(),
                    price: Some("$19.99".to_string()),
                    brand: Some("MockBrand".to_string()),
                    features: vec!["Feature one".to_string()],
                    image_url: Some("https://example.com/image.jpg".to_string()),
                    affiliate_url: source_url.clone(),
                    source_url,
                    acquired_via: AcquiredVia::StructuredApi,
                })
            }
        }
    }
}

/// Recording catalog store with scriptable staleness results.
#[derive(Default)]
pub struct MockCatalog {
    upserted: Mutex<Vec<ProductData>>,
    link_checks: Mutex<Vec<LinkCheck>>,
    stale: Vec<String>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale(mut self, stale: Vec<String>) -> Self {
        self.stale = stale;
        self
    }

    pub fn upserted(&self) -> Vec<ProductData> {
        self.upserted.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn link_checks(&self) -> Vec<LinkCheck> {
        self.link_checks.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CatalogStore for MockCatalog {
    async fn upsert(&self, product: &ProductData) -> Result<(), ProductError> {
        self.upserted
            .lock()
            .map_err(|_| ProductError::System("mock lock poisoned".to_string()))?
            .push(product.clone());
        Ok(())
    }

    async fn record_link_check(&self, check: &LinkCheck) -> Result<(), ProductError> {
        self.link_checks
            .lock()
            .map_err(|_| ProductError::System("mock lock poisoned".to_string()))?
            .push(check.clone());
        Ok(())
    }

    async fn stale_entries(
        &self,
        _older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, ProductError> {
        Ok(self.stale.iter().take(limit).cloned().collect())
    }
}

/// Link probe returning a fixed verdict.
pub struct MockLinkProbe {
    status_code: u16,
    valid: bool,
}

impl MockLinkProbe {
    pub fn valid() -> Self {
        Self {
            status_code: 200,
            valid: true,
        }
    }

    pub fn broken(status_code: u16) -> Self {
        Self {
            status_code,
            valid: false,
        }
    }
}

#[async_trait]
impl LinkProbe for MockLinkProbe {
    async fn check(&self, url: &str) -> Result<LinkCheck, ProductError> {
        Ok(LinkCheck {
            url: url.to_string(),
            status_code: self.status_code,
            valid: self.valid,
            redirect_url: None,
            checked_at: Utc::now(),
        })
    }
}

enum ProbeBehavior {
    Healthy,
    Slow(Duration),
    Failing(String),
    Hanging,
}

/// Component probe with a scripted outcome.
pub struct MockProbe {
    component: &'static str,
    behavior: ProbeBehavior,
}

impl MockProbe {
    pub fn healthy(component: &'static str) -> Self {
        Self {
            component,
            behavior: ProbeBehavior::Healthy,
        }
    }

    /// Answers healthy, but only after `delay`.
    pub fn slow(component: &'static str, delay: Duration) -> Self {
        Self {
            component,
            behavior: ProbeBehavior::Slow(delay),
        }
    }

    pub fn failing(component: &'static str, detail: impl Into<String>) -> Self {
        Self {
            component,
            behavior: ProbeBehavior::Failing(detail.into()),
        }
    }

    /// Never answers within any reasonable probe timeout.
    pub fn hanging(component: &'static str) -> Self {
        Self {
            component,
            behavior: ProbeBehavior::Hanging,
        }
    }
}

#[async_trait]
impl ComponentProbe for MockProbe {
    fn component(&self) -> &'static str {
        self.component
    }

    async fn probe(&self) -> Result<(), ProductError> {
        match &self.behavior {
            ProbeBehavior::Healthy => Ok(()),
            ProbeBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            ProbeBehavior::Failing(detail) => Err(ProductError::System(detail.clone())),
            ProbeBehavior::Hanging => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Reporter that swallows every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl WorkerReporter for NullReporter {}
