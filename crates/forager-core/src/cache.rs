use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;

use crate::product::AcquisitionOutcome;

/// Default time-to-live for successful resolutions.
pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(20 * 60);

/// Default time-to-live for cached failures (negative caching).
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
struct Entry {
    outcome: AcquisitionOutcome,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// TTL cache over resolver outcomes, keyed by lookup key (ASIN or URL).
///
/// Failures are cached too, with a shorter TTL: an unreachable product page
/// stays unreachable for a while, and hammering it on every render only
/// burns the rate budget. Entries never flip from failure to success except
/// by expiring and being re-resolved.
#[derive(Clone)]
pub struct ResultCache {
    inner: Cache<String, Entry>,
    success_ttl: Duration,
    failure_ttl: Duration,
}

impl ResultCache {
    pub fn new(success_ttl: Duration, failure_ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(10_000)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            inner,
            success_ttl,
            failure_ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<AcquisitionOutcome> {
        self.inner.get(key).await.map(|entry| entry.outcome)
    }

    /// Store an outcome; the TTL depends on whether it succeeded.
    pub async fn put(&self, key: &str, outcome: AcquisitionOutcome) {
        let ttl = if outcome.is_success() {
            self.success_ttl
        } else {
            self.failure_ttl
        };
        self.inner
            .insert(key.to_string(), Entry { outcome, ttl })
            .await;
    }

    /// Drop a single entry, forcing the next lookup to re-resolve.
    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_SUCCESS_TTL, DEFAULT_FAILURE_TTL)
    }
}
