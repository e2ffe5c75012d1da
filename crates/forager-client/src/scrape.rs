//! HTML scraper fallback for product pages.
//!
//! Second rung of the ladder: fetches the product page with a desktop
//! browser User-Agent and pulls fields out of the marketplace's stable DOM
//! ids. Selector drift shows up as acquisition failures, not panics.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use forager_core::error::ProductError;
use forager_core::product::{AcquiredVia, AcquisitionRequest, ProductData};
use forager_core::traits::AcquisitionStrategy;
use forager_core::with_affiliate_tag;

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Price selectors tried in order; the first non-empty match wins.
const PRICE_SELECTORS: &[&str] = &[
    "#corePriceDisplay_desktop_featurediv .a-price-whole",
    "#corePriceDisplay_desktop_featurediv .a-offscreen",
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    ".a-price .a-offscreen",
];

pub struct PageScraper {
    client: Client,
    timeout_secs: u64,
}

impl PageScraper {
    pub fn new(timeout: Duration) -> Result<Self, ProductError> {
        let client = Client::builder()
            .user_agent(DESKTOP_UA)
            .timeout(timeout)
            .build()
            .map_err(|e| ProductError::Network(e.to_string()))?;
        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, ProductError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProductError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                ProductError::Network(format!("Connection failed: {e}"))
            } else {
                ProductError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        match status.as_u16() {
            404 => return Err(ProductError::NotFound(url.to_string())),
            429 => return Err(ProductError::RateLimited),
            code if !status.is_success() => {
                return Err(ProductError::Network(format!("HTTP {code} for {url}")));
            }
            _ => {}
        }

        response
            .text()
            .await
            .map_err(|e| ProductError::Network(format!("Failed to read response body: {e}")))
    }
}

#[async_trait]
impl AcquisitionStrategy for PageScraper {
    fn name(&self) -> &'static str {
        "scraper"
    }

    fn kind(&self) -> AcquiredVia {
        AcquiredVia::Scraper
    }

    async fn acquire(&self, request: &AcquisitionRequest) -> Result<ProductData, ProductError> {
        let url = request.product_url().ok_or_else(|| {
            ProductError::InvalidInput("scraper needs an ASIN or a URL".to_string())
        })?;
        let html = self.fetch(&url).await?;
        debug!(url = %url, bytes = html.len(), "product page fetched");

        let asin = request
            .asin
            .as_ref()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default();
        parse_product(&html, &asin, &url, request.affiliate_tag.as_deref())
    }
}

fn selector(css: &str) -> Result<Selector, ProductError> {
    Selector::parse(css).map_err(|e| ProductError::System(format!("bad selector {css}: {e}")))
}

fn first_text(document: &Html, css: &str) -> Result<Option<String>, ProductError> {
    let sel = selector(css)?;
    Ok(document.select(&sel).next().map(|el| {
        el.text().collect::<String>().trim().to_string()
    }))
}

/// Extract product fields from a rendered product page.
///
/// The title is mandatory: a page without `#productTitle` is a bot wall or
/// an interstitial, and is reported as a network-category failure so the
/// next strategy gets a turn.
pub fn parse_product(
    html: &str,
    asin: &str,
    source_url: &str,
    affiliate_tag: Option<&str>,
) -> Result<ProductData, ProductError> {
    let document = Html::parse_document(html);

    let title = first_text(&document, "#productTitle")?
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ProductError::Network(format!("no product title found at {source_url}"))
        })?;

    let mut price = None;
    for css in PRICE_SELECTORS {
        if let Some(found) = first_text(&document, css)?.filter(|p| !p.is_empty()) {
            price = Some(found);
            break;
        }
    }

    let brand = first_text(&document, "#bylineInfo")?.filter(|b| !b.is_empty());

    let features_sel = selector("#feature-bullets ul li span")?;
    let features: Vec<String> = document
        .select(&features_sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .take(5)
        .collect();

    let image_sel = selector("#imgTagWrapperId img")?;
    let image_url = document.select(&image_sel).next().and_then(|el| {
        el.value()
            .attr("data-old-hires")
            .filter(|v| !v.is_empty())
            .or_else(|| el.value().attr("src"))
            .map(str::to_string)
    });

    Ok(ProductData {
        asin: asin.to_string(),
        title,
        price,
        brand,
        features,
        image_url,
        affiliate_url: with_affiliate_tag(source_url, affiliate_tag),
        source_url: source_url.to_string(),
        acquired_via: AcquiredVia::Scraper,
    })
}
