use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::debug;

use forager_core::error::ProductError;
use forager_core::product::LinkCheck;
use forager_core::traits::LinkProbe;

const LINK_CHECK_UA: &str =
    "Mozilla/5.0 (compatible; ForagerLinkCheck/1.0; +https://github.com/forager)";

/// HEAD-request link probe.
///
/// Redirects are not followed: an affiliate link that 301s to the homepage
/// is exactly the signal we want to record, so the probe reports the first
/// hop's status and Location.
pub struct HttpLinkProbe {
    client: Client,
    timeout_secs: u64,
}

impl HttpLinkProbe {
    pub fn new() -> Result<Self, ProductError> {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProductError> {
        let client = Client::builder()
            .user_agent(LINK_CHECK_UA)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ProductError::Network(e.to_string()))?;
        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

/// 2xx and 3xx responses count as a live link.
fn is_live_status(status: u16) -> bool {
    (200..400).contains(&status)
}

#[async_trait]
impl LinkProbe for HttpLinkProbe {
    async fn check(&self, url: &str) -> Result<LinkCheck, ProductError> {
        let response = self.client.head(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProductError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                ProductError::Network(format!("Connection failed: {e}"))
            } else {
                ProductError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let redirect_url = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(url, status, ?redirect_url, "link checked");
        Ok(LinkCheck {
            url: url.to_string(),
            status_code: status,
            valid: is_live_status(status),
            redirect_url,
            checked_at: Utc::now(),
        })
    }
}
