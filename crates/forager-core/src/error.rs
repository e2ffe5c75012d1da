use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error types for the product pipeline.
#[derive(Error, Debug)]
pub enum ProductError {
    /// Network/connection error.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Upstream rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Structured marketplace API call failed.
    #[error("Marketplace API error (HTTP {status_code}): {message}")]
    MarketplaceApi { message: String, status_code: u16 },

    /// Product or resource does not exist upstream.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied identifier or URL is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Credentials rejected or missing.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Affiliate link failed validation.
    #[error("Link validation error: {0}")]
    LinkValidation(String),

    /// Result cache failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Catalog store operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Infrastructure failure outside a single request.
    #[error("System error: {0}")]
    System(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl ProductError {
    /// Stable machine-readable code. Classification (§`classify`) keys off
    /// this string, so codes must not change between releases.
    pub fn code(&self) -> &'static str {
        match self {
            ProductError::Network(_) => "NETWORK_ERROR",
            ProductError::Timeout(_) => "TIMEOUT",
            ProductError::RateLimited => "RATE_LIMIT",
            ProductError::MarketplaceApi { .. } => "MARKETPLACE_API_ERROR",
            ProductError::NotFound(_) => "NOT_FOUND",
            ProductError::InvalidInput(_) => "INVALID_INPUT",
            ProductError::Auth(_) => "AUTH_ERROR",
            ProductError::LinkValidation(_) => "LINK_VALIDATION_ERROR",
            ProductError::Cache(_) => "CACHE_ERROR",
            ProductError::Database(_) => "DATABASE_ERROR",
            ProductError::System(_) => "SYSTEM_ERROR",
            ProductError::Serialization(_) => "SERIALIZATION_ERROR",
            ProductError::Config(_) => "CONFIG_ERROR",
            ProductError::Generic(_) => "UNKNOWN",
        }
    }
}

/// Failure category driving retry and notification behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Expected noise (network, timeouts, rate limits). Retried, not surfaced.
    Temporary,
    /// Unfixable input or missing resource. Never auto-retried.
    Permanent,
    /// Infrastructure trouble. Retried and surfaced to operators.
    System,
}

/// An error annotated with its category and retry disposition.
///
/// Every failure leaving the resolver boundary is one of these; callers make
/// uniform decisions without inspecting the underlying error shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub message: String,
    pub code: String,
    pub category: ErrorCategory,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
    pub context: Option<String>,
}

impl ClassifiedError {
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Classify an error into a category + retry flag.
///
/// Ordered rules, first match wins. Total: an unrecognized code defaults to
/// temporary/retryable, favoring availability over silent data loss.
pub fn classify(error: &ProductError) -> ClassifiedError {
    let code = error.code();

    let (category, retryable) = if code.contains("NETWORK")
        || code.contains("TIMEOUT")
        || code.contains("RATE_LIMIT")
        || code == "MARKETPLACE_API_ERROR"
    {
        (ErrorCategory::Temporary, true)
    } else if code.contains("NOT_FOUND")
        || code.contains("INVALID_INPUT")
        || code.contains("AUTH")
        || code == "LINK_VALIDATION_ERROR"
    {
        (ErrorCategory::Permanent, false)
    } else if code.contains("DATABASE") || code.contains("SYSTEM") || code.contains("CACHE") {
        (ErrorCategory::System, true)
    } else {
        (ErrorCategory::Temporary, true)
    };

    ClassifiedError {
        message: error.to_string(),
        code: code.to_string(),
        category,
        retryable,
        timestamp: Utc::now(),
        context: None,
    }
}

/// Decides when to retry, how long to wait, and what to surface to operators.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    pub max_retries: u32,
    pub max_delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RecoveryPolicy {
    pub fn should_retry(&self, error: &ClassifiedError) -> bool {
        error.retryable
    }

    /// Exponential backoff: 2^attempt seconds, capped at `max_delay`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let secs = 2u64.saturating_pow(attempt);
        std::cmp::min(Duration::from_secs(secs), self.max_delay)
    }

    /// Permanent and system errors need operator attention; temporary
    /// failures are expected noise and stay in the logs.
    pub fn should_notify(&self, error: &ClassifiedError) -> bool {
        matches!(
            error.category,
            ErrorCategory::Permanent | ErrorCategory::System
        )
    }
}
