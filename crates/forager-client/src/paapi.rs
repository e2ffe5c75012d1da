//! Client for the marketplace's structured Product Advertising API.
//!
//! First rung of the acquisition ladder: authoritative data when the
//! credentials are configured and the quota allows.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use forager_core::error::ProductError;
use forager_core::product::{AcquiredVia, AcquisitionRequest, ProductData};
use forager_core::traits::{AcquisitionStrategy, ComponentProbe};
use forager_core::with_affiliate_tag;

use crate::sigv4::{Credentials, SignableRequest, sign};

const GET_ITEMS_TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.GetItems";
const GET_ITEMS_PATH: &str = "/paapi5/getitems";

/// A catalog item that exists on every marketplace, used as a cheap
/// reachability probe.
const PROBE_ASIN: &str = "B08N5WRWNW";

#[derive(Debug, Clone)]
pub struct PaapiConfig {
    pub credentials: Credentials,
    pub partner_tag: String,
    pub host: String,
    pub region: String,
    pub marketplace: String,
}

impl PaapiConfig {
    /// Read configuration from `FORAGER_PAAPI_*`. Returns `Ok(None)` when the
    /// credentials are absent, meaning the strategy is simply not installed.
    pub fn from_env() -> Result<Option<Self>, ProductError> {
        let (Ok(access_key), Ok(secret_key)) = (
            env::var("FORAGER_PAAPI_ACCESS_KEY"),
            env::var("FORAGER_PAAPI_SECRET_KEY"),
        ) else {
            return Ok(None);
        };
        let partner_tag = env::var("FORAGER_PAAPI_PARTNER_TAG").map_err(|_| {
            ProductError::Config(
                "FORAGER_PAAPI_PARTNER_TAG is required when API credentials are set".to_string(),
            )
        })?;
        Ok(Some(Self {
            credentials: Credentials {
                access_key,
                secret_key,
            },
            partner_tag,
            host: env::var("FORAGER_PAAPI_HOST")
                .unwrap_or_else(|_| "webservices.amazon.com".to_string()),
            region: env::var("FORAGER_PAAPI_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            marketplace: env::var("FORAGER_PAAPI_MARKETPLACE")
                .unwrap_or_else(|_| "www.amazon.com".to_string()),
        }))
    }
}

pub struct MarketplaceApi {
    client: Client,
    config: PaapiConfig,
    timeout_secs: u64,
}

impl MarketplaceApi {
    pub fn new(config: PaapiConfig, timeout: Duration) -> Result<Self, ProductError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProductError::Network(e.to_string()))?;
        Ok(Self {
            client,
            config,
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn get_items(&self, asin: &str) -> Result<GetItemsResponse, ProductError> {
        let payload = json!({
            "ItemIds": [asin],
            "PartnerTag": self.config.partner_tag,
            "PartnerType": "Associates",
            "Marketplace": self.config.marketplace,
            "Resources": [
                "ItemInfo.Title",
                "ItemInfo.ByLineInfo",
                "ItemInfo.Features",
                "Offers.Listings.Price",
                "Images.Primary.Large",
            ],
        })
        .to_string();

        let signature = sign(
            &SignableRequest {
                method: "POST",
                host: &self.config.host,
                path: GET_ITEMS_PATH,
                payload: &payload,
                extra_headers: &[
                    ("content-encoding", "amz-1.0"),
                    ("x-amz-target", GET_ITEMS_TARGET),
                ],
            },
            &self.config.credentials,
            &self.config.region,
            "ProductAdvertisingAPI",
            Utc::now(),
        )?;

        let response = self
            .client
            .post(format!("https://{}{GET_ITEMS_PATH}", self.config.host))
            .header("content-type", "application/json; charset=utf-8")
            .header("content-encoding", "amz-1.0")
            .header("x-amz-target", GET_ITEMS_TARGET)
            .header("x-amz-date", &signature.amz_date)
            .header("authorization", &signature.authorization)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
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
            429 => return Err(ProductError::RateLimited),
            404 => return Err(ProductError::NotFound(asin.to_string())),
            401 | 403 => {
                return Err(ProductError::Auth(format!(
                    "marketplace API rejected credentials (HTTP {})",
                    status.as_u16()
                )));
            }
            code if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProductError::MarketplaceApi {
                    message: body.chars().take(200).collect(),
                    status_code: code,
                });
            }
            _ => {}
        }

        let body = response
            .json::<GetItemsResponse>()
            .await
            .map_err(|e| ProductError::Network(format!("Failed to read response body: {e}")))?;
        debug!(asin, "GetItems responded");
        Ok(body)
    }
}

#[async_trait]
impl AcquisitionStrategy for MarketplaceApi {
    fn name(&self) -> &'static str {
        "structured_api"
    }

    fn kind(&self) -> AcquiredVia {
        AcquiredVia::StructuredApi
    }

    async fn acquire(&self, request: &AcquisitionRequest) -> Result<ProductData, ProductError> {
        let asin = request.asin.as_ref().ok_or_else(|| {
            ProductError::InvalidInput("structured API lookup requires an ASIN".to_string())
        })?;
        let response = self.get_items(asin.as_str()).await?;
        into_product(response, asin.as_str(), request.affiliate_tag.as_deref())
    }
}

#[async_trait]
impl ComponentProbe for MarketplaceApi {
    fn component(&self) -> &'static str {
        "marketplace_api"
    }

    async fn probe(&self) -> Result<(), ProductError> {
        // NotFound still proves the API answered and accepted our signature.
        match self.get_items(PROBE_ASIN).await {
            Ok(_) | Err(ProductError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Response mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GetItemsResponse {
    #[serde(rename = "ItemsResult")]
    items_result: Option<ItemsResult>,
    #[serde(rename = "Errors", default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ItemsResult {
    #[serde(rename = "Items", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "ASIN")]
    asin: String,
    #[serde(rename = "DetailPageURL")]
    detail_page_url: Option<String>,
    #[serde(rename = "ItemInfo")]
    item_info: Option<ItemInfo>,
    #[serde(rename = "Offers")]
    offers: Option<Offers>,
    #[serde(rename = "Images")]
    images: Option<Images>,
}

#[derive(Debug, Deserialize)]
struct ItemInfo {
    #[serde(rename = "Title")]
    title: Option<DisplayValue>,
    #[serde(rename = "ByLineInfo")]
    by_line_info: Option<ByLineInfo>,
    #[serde(rename = "Features")]
    features: Option<DisplayValues>,
}

#[derive(Debug, Deserialize)]
struct DisplayValue {
    #[serde(rename = "DisplayValue")]
    display_value: String,
}

#[derive(Debug, Deserialize)]
struct DisplayValues {
    #[serde(rename = "DisplayValues", default)]
    display_values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ByLineInfo {
    #[serde(rename = "Brand")]
    brand: Option<DisplayValue>,
}

#[derive(Debug, Deserialize)]
struct Offers {
    #[serde(rename = "Listings", default)]
    listings: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(rename = "Price")]
    price: Option<Price>,
}

#[derive(Debug, Deserialize)]
struct Price {
    #[serde(rename = "DisplayAmount")]
    display_amount: String,
}

#[derive(Debug, Deserialize)]
struct Images {
    #[serde(rename = "Primary")]
    primary: Option<ImageSet>,
}

#[derive(Debug, Deserialize)]
struct ImageSet {
    #[serde(rename = "Large")]
    large: Option<ImageUrl>,
}

#[derive(Debug, Deserialize)]
struct ImageUrl {
    #[serde(rename = "URL")]
    url: String,
}

fn into_product(
    response: GetItemsResponse,
    asin: &str,
    affiliate_tag: Option<&str>,
) -> Result<ProductData, ProductError> {
    if let Some(error) = response.errors.first() {
        if error.code.contains("ItemNot") {
            return Err(ProductError::NotFound(asin.to_string()));
        }
        return Err(ProductError::MarketplaceApi {
            message: format!("{}: {}", error.code, error.message),
            status_code: 200,
        });
    }

    let item = response
        .items_result
        .and_then(|r| r.items.into_iter().next())
        .ok_or_else(|| ProductError::NotFound(asin.to_string()))?;

    let source_url = item
        .detail_page_url
        .unwrap_or_else(|| format!("https://www.amazon.com/dp/{asin}"));
    let info = item.item_info;

    Ok(ProductData {
        asin: item.asin,
        title: info
            .as_ref()
            .and_then(|i| i.title.as_ref())
            .map(|t| t.display_value.clone())
            .unwrap_or_else(|| format!("Product {asin}")),
        price: item
            .offers
            .and_then(|o| o.listings.into_iter().next())
            .and_then(|l| l.price)
            .map(|p| p.display_amount),
        brand: info
            .as_ref()
            .and_then(|i| i.by_line_info.as_ref())
            .and_then(|b| b.brand.as_ref())
            .map(|b| b.display_value.clone()),
        features: info
            .and_then(|i| i.features)
            .map(|f| f.display_values)
            .unwrap_or_default(),
        image_url: item
            .images
            .and_then(|i| i.primary)
            .and_then(|p| p.large)
            .map(|l| l.url),
        affiliate_url: with_affiliate_tag(&source_url, affiliate_tag),
        source_url,
        acquired_via: AcquiredVia::StructuredApi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM_RESPONSE: &str = r#"{
        "ItemsResult": {
            "Items": [{
                "ASIN": "B08N5WRWNW",
                "DetailPageURL": "https://www.amazon.com/dp/B08N5WRWNW",
                "ItemInfo": {
                    "Title": {"DisplayValue": "Echo Dot (4th Gen)"},
                    "ByLineInfo": {"Brand": {"DisplayValue": "Amazon"}},
                    "Features": {"DisplayValues": ["Smart speaker", "Voice control"]}
                },
                "Offers": {"Listings": [{"Price": {"DisplayAmount": "$49.99"}}]},
                "Images": {"Primary": {"Large": {"URL": "https://m.media-amazon.com/images/I/echo.jpg"}}}
            }]
        }
    }"#;

    #[test]
    fn maps_full_item_response() {
        let response: GetItemsResponse = serde_json::from_str(ITEM_RESPONSE).unwrap();
        let product = into_product(response, "B08N5WRWNW", Some("site-20")).unwrap();

        assert_eq!(product.title, "Echo Dot (4th Gen)");
        assert_eq!(product.price.as_deref(), Some("$49.99"));
        assert_eq!(product.brand.as_deref(), Some("Amazon"));
        assert_eq!(product.features.len(), 2);
        assert_eq!(product.acquired_via, AcquiredVia::StructuredApi);
        assert!(product.affiliate_url.contains("tag=site-20"));
    }

    #[test]
    fn sparse_item_falls_back_to_defaults() {
        let response: GetItemsResponse =
            serde_json::from_str(r#"{"ItemsResult": {"Items": [{"ASIN": "B08N5WRWNW"}]}}"#)
                .unwrap();
        let product = into_product(response, "B08N5WRWNW", None).unwrap();

        assert_eq!(product.title, "Product B08N5WRWNW");
        assert!(product.price.is_none());
        assert!(product.features.is_empty());
        assert_eq!(product.source_url, "https://www.amazon.com/dp/B08N5WRWNW");
    }

    #[test]
    fn item_not_found_error_entry_maps_to_not_found() {
        let response: GetItemsResponse = serde_json::from_str(
            r#"{"Errors": [{"Code": "ItemNotAccessible", "Message": "ASIN not found"}]}"#,
        )
        .unwrap();
        let err = into_product(response, "B000000000", None).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn other_error_entries_are_api_errors() {
        let response: GetItemsResponse = serde_json::from_str(
            r#"{"Errors": [{"Code": "TooManyRequests", "Message": "slow down"}]}"#,
        )
        .unwrap();
        let err = into_product(response, "B08N5WRWNW", None).unwrap_err();
        assert_eq!(err.code(), "MARKETPLACE_API_ERROR");
    }

    #[test]
    fn empty_items_is_not_found() {
        let response: GetItemsResponse =
            serde_json::from_str(r#"{"ItemsResult": {"Items": []}}"#).unwrap();
        assert_eq!(
            into_product(response, "B08N5WRWNW", None).unwrap_err().code(),
            "NOT_FOUND"
        );
    }
}
