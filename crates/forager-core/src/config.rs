use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ProductError;
use crate::health::BacklogThresholds;

/// Pipeline tunables, read once at startup from `FORAGER_*` environment
/// variables. Every field has a production default; unset variables are
/// fine, unparseable ones are a config error.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// TTL for cached successful resolutions.
    pub cache_ttl: Duration,
    /// TTL for cached failures (negative cache).
    pub failure_ttl: Duration,
    /// Delay between consecutive targets within one job.
    pub pacing: Duration,
    /// Per-request timeout for outbound fetches.
    pub fetch_timeout: Duration,
    /// Number of background worker loops.
    pub workers: usize,
    /// How often an idle worker polls the queue.
    pub poll_interval: Duration,
    /// Queue-backlog levels for the health verdict.
    pub backlog: BacklogThresholds,
    /// Timeout applied to each component health probe.
    pub probe_timeout: Duration,
    /// Probe round-trip time past which a healthy component reports degraded.
    pub probe_slow_after: Duration,
    /// Default affiliate tag appended to product links.
    pub affiliate_tag: Option<String>,
    /// Whether the screenshot fallback strategy is enabled.
    pub enable_screenshots: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(20 * 60),
            failure_ttl: Duration::from_secs(5 * 60),
            pacing: Duration::from_millis(200),
            fetch_timeout: Duration::from_secs(3),
            workers: 2,
            poll_interval: Duration::from_secs(2),
            backlog: BacklogThresholds::default(),
            probe_timeout: Duration::from_secs(2),
            probe_slow_after: Duration::from_millis(1000),
            affiliate_tag: None,
            enable_screenshots: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ProductError> {
        let defaults = Self::default();
        Ok(Self {
            cache_ttl: secs("FORAGER_CACHE_TTL_SECS", defaults.cache_ttl)?,
            failure_ttl: secs("FORAGER_FAILURE_TTL_SECS", defaults.failure_ttl)?,
            pacing: millis("FORAGER_PACING_MS", defaults.pacing)?,
            fetch_timeout: secs("FORAGER_FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            workers: parsed("FORAGER_WORKERS", defaults.workers)?,
            poll_interval: secs("FORAGER_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            backlog: BacklogThresholds {
                degraded: parsed("FORAGER_BACKLOG_DEGRADED", defaults.backlog.degraded)?,
                unhealthy: parsed("FORAGER_BACKLOG_UNHEALTHY", defaults.backlog.unhealthy)?,
            },
            probe_timeout: secs("FORAGER_PROBE_TIMEOUT_SECS", defaults.probe_timeout)?,
            probe_slow_after: millis("FORAGER_PROBE_SLOW_MS", defaults.probe_slow_after)?,
            affiliate_tag: env::var("FORAGER_AFFILIATE_TAG").ok().filter(|s| !s.is_empty()),
            enable_screenshots: env::var("FORAGER_ENABLE_SCREENSHOTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T, ProductError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ProductError::Config(format!("{key}={raw} is not valid"))),
        Err(_) => Ok(default),
    }
}

fn secs(key: &str, default: Duration) -> Result<Duration, ProductError> {
    Ok(Duration::from_secs(parsed(key, default.as_secs())?))
}

fn millis(key: &str, default: Duration) -> Result<Duration, ProductError> {
    Ok(Duration::from_millis(parsed(key, default.as_millis() as u64)?))
}
