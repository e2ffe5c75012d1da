use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClassifiedError, ErrorCategory, ProductError};
use crate::job::QueueStats;
use crate::queue::InMemoryJobQueue;
use crate::resolver::ResolverMetrics;
use crate::traits::ComponentProbe;

/// Health verdict for one component or the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    fn severity(self) -> u8 {
        match self {
            ComponentStatus::Healthy => 0,
            ComponentStatus::Degraded => 1,
            ComponentStatus::Unhealthy => 2,
        }
    }

    /// Worst-of combinator: the system is only as healthy as its sickest part.
    pub fn worst(self, other: ComponentStatus) -> ComponentStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub component: String,
    pub status: ComponentStatus,
    /// Probe round-trip time; absent for derived components (queue, resolver).
    pub response_time_ms: Option<u64>,
    pub detail: Option<String>,
}

/// An operator-visible alert raised from a permanent or system failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub code: String,
    pub message: String,
    /// Critical alerts (system-category failures) force the overall verdict
    /// to unhealthy; non-critical ones only degrade it.
    pub critical: bool,
    pub raised_at: DateTime<Utc>,
}

/// In-process registry of active alerts.
///
/// Deduplicates by error code: a flapping subsystem raises one alert, not
/// one per occurrence.
#[derive(Default)]
pub struct AlertRegistry {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, error: &ClassifiedError) {
        let Ok(mut alerts) = self.alerts.lock() else {
            return;
        };
        if alerts.iter().any(|a| a.code == error.code) {
            return;
        }
        alerts.push(Alert {
            id: Uuid::new_v4(),
            code: error.code.clone(),
            message: error.message.clone(),
            critical: error.category == ErrorCategory::System,
            raised_at: error.timestamp,
        });
    }

    pub fn resolve(&self, code: &str) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.retain(|a| a.code != code);
        }
    }

    pub fn active(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

/// Backlog levels at which the job queue component degrades.
#[derive(Debug, Clone, Copy)]
pub struct BacklogThresholds {
    pub degraded: usize,
    pub unhealthy: usize,
}

impl Default for BacklogThresholds {
    fn default() -> Self {
        Self {
            degraded: 100,
            unhealthy: 500,
        }
    }
}

/// Full system health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: ComponentStatus,
    pub components: Vec<ComponentReport>,
    pub queue: QueueStats,
    pub alerts: Vec<Alert>,
    pub checked_at: DateTime<Utc>,
}

/// Aggregates component probes, queue pressure, resolver error rate, and
/// active alerts into a single verdict.
pub struct HealthAggregator {
    probes: Vec<Arc<dyn ComponentProbe>>,
    queue: Arc<InMemoryJobQueue>,
    metrics: Arc<ResolverMetrics>,
    alerts: Arc<AlertRegistry>,
    thresholds: BacklogThresholds,
    probe_timeout: Duration,
    slow_after: Duration,
}

impl HealthAggregator {
    pub fn new(
        probes: Vec<Arc<dyn ComponentProbe>>,
        queue: Arc<InMemoryJobQueue>,
        metrics: Arc<ResolverMetrics>,
        alerts: Arc<AlertRegistry>,
        thresholds: BacklogThresholds,
        probe_timeout: Duration,
        slow_after: Duration,
    ) -> Self {
        Self {
            probes,
            queue,
            metrics,
            alerts,
            thresholds,
            probe_timeout,
            slow_after,
        }
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let mut components = Vec::new();
        let mut overall = ComponentStatus::Healthy;

        for probe in &self.probes {
            let started = std::time::Instant::now();
            let outcome = tokio::time::timeout(self.probe_timeout, probe.probe()).await;
            let elapsed = started.elapsed();
            let elapsed_ms = elapsed.as_millis() as u64;

            let report = match outcome {
                // Answering is not enough: a sluggish dependency degrades
                // the component before it times out outright.
                Ok(Ok(())) if elapsed > self.slow_after => ComponentReport {
                    component: probe.component().to_string(),
                    status: ComponentStatus::Degraded,
                    response_time_ms: Some(elapsed_ms),
                    detail: Some(format!("responded in {elapsed_ms}ms")),
                },
                Ok(Ok(())) => ComponentReport {
                    component: probe.component().to_string(),
                    status: ComponentStatus::Healthy,
                    response_time_ms: Some(elapsed_ms),
                    detail: None,
                },
                Ok(Err(err)) => ComponentReport {
                    component: probe.component().to_string(),
                    status: ComponentStatus::Unhealthy,
                    response_time_ms: Some(elapsed_ms),
                    detail: Some(err.to_string()),
                },
                Err(_) => ComponentReport {
                    component: probe.component().to_string(),
                    status: ComponentStatus::Unhealthy,
                    response_time_ms: Some(self.probe_timeout.as_millis() as u64),
                    detail: Some(format!(
                        "probe timed out after {}ms",
                        self.probe_timeout.as_millis()
                    )),
                },
            };
            overall = overall.worst(report.status);
            components.push(report);
        }

        let (queue_stats, queue_report) = queue_component(self.queue.stats(), self.thresholds);
        overall = overall.worst(queue_report.status);
        components.push(queue_report);

        // A resolver that fails more often than it succeeds is worth a
        // degraded verdict, but only once the sample is meaningful.
        let snapshot = self.metrics.snapshot();
        let resolver_status = if snapshot.attempts >= 10 && snapshot.error_rate > 0.5 {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        };
        overall = overall.worst(resolver_status);
        components.push(ComponentReport {
            component: "resolver".to_string(),
            status: resolver_status,
            response_time_ms: None,
            detail: (resolver_status != ComponentStatus::Healthy).then(|| {
                format!(
                    "{:.0}% of {} resolutions failed",
                    snapshot.error_rate * 100.0,
                    snapshot.attempts
                )
            }),
        });

        let alerts = self.alerts.active();
        if alerts.iter().any(|a| a.critical) {
            overall = overall.worst(ComponentStatus::Unhealthy);
        } else if !alerts.is_empty() {
            overall = overall.worst(ComponentStatus::Degraded);
        }

        HealthSnapshot {
            status: overall,
            components,
            queue: queue_stats,
            alerts,
            checked_at: Utc::now(),
        }
    }
}

/// Derive the job-queue component from a stats read.
///
/// A failed read means the queue itself is broken, which is worse than any
/// backlog level, so it reports unhealthy rather than an empty healthy queue.
fn queue_component(
    stats: Result<QueueStats, ProductError>,
    thresholds: BacklogThresholds,
) -> (QueueStats, ComponentReport) {
    let stats = match stats {
        Ok(stats) => stats,
        Err(err) => {
            return (
                QueueStats::default(),
                ComponentReport {
                    component: "job_queue".to_string(),
                    status: ComponentStatus::Unhealthy,
                    response_time_ms: None,
                    detail: Some(err.to_string()),
                },
            );
        }
    };

    let backlog = stats.backlog();
    let status = if backlog > thresholds.unhealthy {
        ComponentStatus::Unhealthy
    } else if backlog > thresholds.degraded {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    };
    let report = ComponentReport {
        component: "job_queue".to_string(),
        status,
        response_time_ms: None,
        detail: (status != ComponentStatus::Healthy).then(|| format!("backlog of {backlog} jobs")),
    };
    (stats, report)
}
