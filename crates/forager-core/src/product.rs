use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asin::{Asin, ImageSize, with_affiliate_tag};
use crate::error::ClassifiedError;

/// Which strategy in the fallback chain produced a result.
///
/// Recorded on every success so later refreshes know whether a
/// higher-fidelity strategy is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquiredVia {
    StructuredApi,
    Scraper,
    Screenshot,
    Placeholder,
}

impl AcquiredVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquiredVia::StructuredApi => "structured_api",
            AcquiredVia::Scraper => "scraper",
            AcquiredVia::Screenshot => "screenshot",
            AcquiredVia::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for AcquiredVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to acquire product data. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    pub asin: Option<Asin>,
    pub url: Option<String>,
    pub affiliate_tag: Option<String>,
}

impl AcquisitionRequest {
    pub fn for_asin(asin: Asin) -> Self {
        Self {
            asin: Some(asin),
            url: None,
            affiliate_tag: None,
        }
    }

    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            asin: None,
            url: Some(url.into()),
            affiliate_tag: None,
        }
    }

    pub fn with_affiliate_tag(mut self, tag: impl Into<String>) -> Self {
        self.affiliate_tag = Some(tag.into());
        self
    }

    /// Cache/lookup key: the ASIN when known, otherwise the raw URL.
    pub fn lookup_key(&self) -> Option<String> {
        self.asin
            .as_ref()
            .map(|a| a.as_str().to_string())
            .or_else(|| self.url.clone())
    }

    /// Product-page URL to hit: explicit URL wins, else derived from ASIN.
    pub fn product_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| self.asin.as_ref().map(Asin::product_url))
    }
}

/// Displayable product data produced by one acquisition strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductData {
    pub asin: String,
    pub title: String,
    pub price: Option<String>,
    pub brand: Option<String>,
    pub features: Vec<String>,
    pub image_url: Option<String>,
    pub source_url: String,
    pub affiliate_url: String,
    pub acquired_via: AcquiredVia,
}

/// Stock image shown when there is no ASIN to derive a product image from.
pub const STATIC_PLACEHOLDER_IMAGE: &str =
    "https://images.unsplash.com/photo-1607748862156-7c548e7e98f4?w=400&h=400&fit=crop&auto=format&q=80";

impl ProductData {
    /// Minimal placeholder product for an ASIN: deterministic image URL and
    /// generic text fields, used when every network strategy has failed.
    pub fn placeholder(asin: &Asin, affiliate_tag: Option<&str>) -> Self {
        let source_url = asin.product_url();
        Self {
            asin: asin.as_str().to_string(),
            title: format!("Product {asin}"),
            price: None,
            brand: None,
            features: Vec::new(),
            image_url: Some(asin.image_url(ImageSize::Medium)),
            affiliate_url: with_affiliate_tag(&source_url, affiliate_tag),
            source_url,
            acquired_via: AcquiredVia::Placeholder,
        }
    }

    /// Last-ditch placeholder for a URL with no extractable ASIN: the link
    /// still renders, with a stock image standing in for the product shot.
    pub fn placeholder_for_url(url: &str, affiliate_tag: Option<&str>) -> Self {
        Self {
            asin: String::new(),
            title: "Product".to_string(),
            price: None,
            brand: None,
            features: Vec::new(),
            image_url: Some(STATIC_PLACEHOLDER_IMAGE.to_string()),
            affiliate_url: with_affiliate_tag(url, affiliate_tag),
            source_url: url.to_string(),
            acquired_via: AcquiredVia::Placeholder,
        }
    }
}

/// Terminal failure report attached to a resolver outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub error: ClassifiedError,
    /// Best-known identifier, empty when even that was missing.
    pub asin: String,
}

/// Terminal result of a resolve: success or a classified failure.
///
/// Failures are values, not raised errors. Callers (job queue, bulk
/// endpoints) branch on the variant without unwinding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AcquisitionOutcome {
    Success(ProductData),
    Failure(FailureReport),
}

impl AcquisitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AcquisitionOutcome::Success(_))
    }

    pub fn product(&self) -> Option<&ProductData> {
        match self {
            AcquisitionOutcome::Success(p) => Some(p),
            AcquisitionOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            AcquisitionOutcome::Success(_) => None,
            AcquisitionOutcome::Failure(f) => Some(f),
        }
    }
}

/// Result of probing an affiliate link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCheck {
    pub url: String,
    pub status_code: u16,
    pub valid: bool,
    pub redirect_url: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_key_prefers_asin_over_url() {
        let asin = Asin::parse("B08N5WRWNW").unwrap();
        let mut req = AcquisitionRequest::for_asin(asin);
        req.url = Some("https://www.amazon.com/dp/B08N5WRWNW".to_string());
        assert_eq!(req.lookup_key().unwrap(), "B08N5WRWNW");

        let req = AcquisitionRequest::for_url("https://example.com/p/1");
        assert_eq!(req.lookup_key().unwrap(), "https://example.com/p/1");
    }

    #[test]
    fn placeholder_has_deterministic_image_and_tagged_link() {
        let asin = Asin::parse("B08N5WRWNW").unwrap();
        let product = ProductData::placeholder(&asin, Some("site-20"));

        assert_eq!(product.acquired_via, AcquiredVia::Placeholder);
        assert_eq!(
            product.image_url.as_deref().unwrap(),
            "https://images-na.ssl-images-amazon.com/images/P/B08N5WRWNW.01._SL300_.jpg"
        );
        assert!(product.affiliate_url.contains("tag=site-20"));
        assert_eq!(product.source_url, "https://www.amazon.com/dp/B08N5WRWNW");
    }

    #[test]
    fn acquired_via_serializes_snake_case() {
        let json = serde_json::to_string(&AcquiredVia::StructuredApi).unwrap();
        assert_eq!(json, "\"structured_api\"");
    }
}
