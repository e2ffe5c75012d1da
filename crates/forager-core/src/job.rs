use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClassifiedError, ProductError};

/// The kinds of background work the pipeline performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Re-acquire product images that have gone stale or broken.
    RefreshImage,
    /// Probe an affiliate link and record whether it still resolves.
    ValidateLink,
    /// Resolve a batch of products through the full strategy chain.
    BulkScrape,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::RefreshImage => "refresh_image",
            JobKind::ValidateLink => "validate_link",
            JobKind::BulkScrape => "bulk_scrape",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ProductError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refresh_image" => Ok(JobKind::RefreshImage),
            "validate_link" => Ok(JobKind::ValidateLink),
            "bulk_scrape" => Ok(JobKind::BulkScrape),
            other => Err(ProductError::InvalidInput(format!(
                "unknown job kind: {other}"
            ))),
        }
    }
}

/// Job lifecycle. Terminal states are final: a failed item is never
/// reset to pending; retries are issued as fresh items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ProductError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ProductError::InvalidInput(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// A unit of background work.
///
/// `targets` holds the identifiers the job operates on (ASINs or URLs,
/// depending on the kind). `attempt` counts how many times this piece of
/// work has been tried across retry lineage; `not_before` delays pickup
/// for backoff. `succeeded`/`failed` tally per-target outcomes once the
/// job reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobItem {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub targets: Vec<String>,
    pub affiliate_tag: Option<String>,
    pub attempt: u32,
    pub not_before: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<ClassifiedError>,
    pub succeeded: u32,
    pub failed: u32,
}

impl JobItem {
    pub fn new(kind: JobKind, targets: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Pending,
            targets,
            affiliate_tag: None,
            attempt: 0,
            not_before: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn with_affiliate_tag(mut self, tag: impl Into<String>) -> Self {
        self.affiliate_tag = Some(tag.into());
        self
    }

    /// Whether this item is eligible to be claimed at `now`.
    pub fn ready_at(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.not_before.is_none_or(|t| t <= now)
    }
}

/// Point-in-time queue counters, reported by the health aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl QueueStats {
    /// Work not yet done: pending plus running.
    pub fn backlog(&self) -> usize {
        self.pending + self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_status_round_trip_as_strings() {
        for kind in [JobKind::RefreshImage, JobKind::ValidateLink, JobKind::BulkScrape] {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("reticulate_splines".parse::<JobKind>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn new_item_is_ready_immediately() {
        let item = JobItem::new(JobKind::ValidateLink, vec!["https://example.com".into()]);
        assert_eq!(item.status, JobStatus::Pending);
        assert_eq!(item.attempt, 0);
        assert!(item.ready_at(Utc::now()));
    }

    #[test]
    fn not_before_delays_readiness() {
        let mut item = JobItem::new(JobKind::RefreshImage, vec!["B08N5WRWNW".into()]);
        item.not_before = Some(Utc::now() + chrono::Duration::seconds(30));
        assert!(!item.ready_at(Utc::now()));
        assert!(item.ready_at(Utc::now() + chrono::Duration::seconds(60)));
    }

    #[test]
    fn backlog_counts_pending_and_running() {
        let stats = QueueStats {
            pending: 7,
            running: 2,
            succeeded: 40,
            failed: 1,
        };
        assert_eq!(stats.backlog(), 9);
    }
}
