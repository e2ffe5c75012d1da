use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ProductError;

/// Marketplace product identifier: exactly 10 ASCII uppercase alphanumerics.
///
/// Validated at construction so the rest of the pipeline never sees a
/// malformed identifier; rejection happens before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asin(String);

impl Asin {
    pub const LEN: usize = 10;

    pub fn parse(s: &str) -> Result<Self, ProductError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ProductError::InvalidInput("empty identifier".to_string()));
        }
        if s.len() != Self::LEN
            || !s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(ProductError::InvalidInput(format!(
                "'{s}' is not a valid ASIN (expected {} uppercase alphanumerics)",
                Self::LEN
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Extract an ASIN from a product URL: the path segment following `dp`.
    ///
    /// Returns `None` for unparseable URLs or URLs without a `/dp/<asin>`
    /// segment; callers then fall back to the URL itself as lookup key.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let mut segments = parsed.path_segments()?;
        segments
            .by_ref()
            .find(|segment| *segment == "dp")
            .and_then(|_| segments.next())
            .and_then(|candidate| Self::parse(candidate).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical product-page URL for this ASIN.
    pub fn product_url(&self) -> String {
        format!("https://www.amazon.com/dp/{}", self.0)
    }

    /// Deterministic product image URL built from the ASIN alone.
    ///
    /// Last-resort visual when neither the structured API nor the scraper
    /// produced an image; the pattern is the marketplace's stable
    /// media-host format and resolves for most catalog items.
    pub fn image_url(&self, size: ImageSize) -> String {
        format!(
            "https://images-na.ssl-images-amazon.com/images/P/{}.01.{}.jpg",
            self.0,
            size.suffix()
        )
    }
}

impl fmt::Display for Asin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Asin {
    type Err = ProductError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Image variant selector for the deterministic media-host URL pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    Small,
    Medium,
    Large,
}

impl ImageSize {
    fn suffix(&self) -> &'static str {
        match self {
            ImageSize::Small => "_SL160_",
            ImageSize::Medium => "_SL300_",
            ImageSize::Large => "_SL500_",
        }
    }
}

/// Set (or overwrite) the affiliate tag query parameter on a product URL.
///
/// Invalid URLs are returned unchanged: the link is still usable, just
/// untagged.
pub fn with_affiliate_tag(url: &str, tag: Option<&str>) -> String {
    let Some(tag) = tag else {
        return url.to_string();
    };
    match Url::parse(url) {
        Ok(mut parsed) => {
            // query_pairs_mut appends, so drop any existing tag first.
            let kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| k != "tag")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            parsed.set_query(None);
            {
                let mut pairs = parsed.query_pairs_mut();
                for (k, v) in &kept {
                    pairs.append_pair(k, v);
                }
                pairs.append_pair("tag", tag);
            }
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}
