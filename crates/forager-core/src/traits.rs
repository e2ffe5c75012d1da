use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProductError;
use crate::product::{AcquiredVia, AcquisitionRequest, LinkCheck, ProductData};

/// One rung of the acquisition fallback ladder.
///
/// Strategies run as a boxed ordered chain, so the trait is object-safe via
/// `async_trait`. A strategy returns `Err` to hand off to the next rung;
/// only the final placeholder rung is infallible in practice.
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    /// Short stable name, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Which provenance this rung stamps on the products it yields.
    fn kind(&self) -> AcquiredVia;

    async fn acquire(&self, request: &AcquisitionRequest) -> Result<ProductData, ProductError>;
}

/// Persists resolved product data and answers staleness queries.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert(&self, product: &ProductData) -> Result<(), ProductError>;

    async fn record_link_check(&self, check: &LinkCheck) -> Result<(), ProductError>;

    /// Lookup keys whose entries were last refreshed before `older_than`.
    async fn stale_entries(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, ProductError>;
}

/// Probes whether an affiliate link still resolves.
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn check(&self, url: &str) -> Result<LinkCheck, ProductError>;
}

/// Liveness check for one named subsystem, used by the health aggregator.
#[async_trait]
pub trait ComponentProbe: Send + Sync {
    fn component(&self) -> &'static str;

    /// `Ok(())` means healthy; the error explains what is wrong.
    async fn probe(&self) -> Result<(), ProductError>;
}

/// A no-op CatalogStore for deployments without persistence.
#[derive(Debug, Clone)]
pub struct NullCatalog;

#[async_trait]
impl CatalogStore for NullCatalog {
    async fn upsert(&self, _product: &ProductData) -> Result<(), ProductError> {
        Ok(())
    }

    async fn record_link_check(&self, _check: &LinkCheck) -> Result<(), ProductError> {
        Ok(())
    }

    async fn stale_entries(
        &self,
        _older_than: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<String>, ProductError> {
        Ok(vec![])
    }
}
