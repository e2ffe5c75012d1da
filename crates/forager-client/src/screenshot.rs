//! Screenshot fallback via headless Chromium (Chrome DevTools Protocol).
//!
//! Third rung of the ladder: when the structured API and the scraper both
//! fail, a rendered screenshot still gives the storefront something to
//! show. Gated behind the `browser` cargo feature.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;

use forager_core::error::ProductError;
use forager_core::product::{AcquiredVia, AcquisitionRequest, ProductData};
use forager_core::traits::AcquisitionStrategy;
use forager_core::with_affiliate_tag;

pub struct ScreenshotCapture {
    browser: Arc<Browser>,
    timeout: Duration,
    output_dir: PathBuf,
}

impl ScreenshotCapture {
    /// Launches a headless Chromium browser; captured images land in
    /// `output_dir` as `<asin>.png`.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH` (or the
    /// default locations checked by `chromiumoxide`).
    pub async fn new(output_dir: PathBuf, timeout: Duration) -> Result<Self, ProductError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        // Snap-packaged Chromium exposes a wrapper that rejects standard
        // Chrome CLI flags; locate the real binary when possible and fall
        // back to chromiumoxide's own lookup otherwise.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .build()
            .map_err(|e| ProductError::System(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ProductError::System(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| ProductError::System(format!("cannot create screenshot dir: {e}")))?;

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
            output_dir,
        })
    }

    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];
        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    async fn capture(&self, url: &str, asin: &str) -> Result<(PathBuf, Option<String>), ProductError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| ProductError::Network(format!("Failed to navigate to {url}: {e}")))?;

        // Wait until <body> is present, the minimal signal that the page
        // rendered its main content.
        page.find_element("body")
            .await
            .map_err(|e| ProductError::Network(format!("Page did not render body: {e}")))?;

        let title = page.get_title().await.ok().flatten();

        let png = page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(|e| ProductError::Network(format!("Screenshot capture failed: {e}")))?;

        let _ = page.close().await;

        let path = screenshot_path(&self.output_dir, asin);
        tokio::fs::write(&path, png)
            .await
            .map_err(|e| ProductError::System(format!("cannot write screenshot: {e}")))?;
        Ok((path, title))
    }
}

fn screenshot_path(dir: &Path, asin: &str) -> PathBuf {
    dir.join(format!("{asin}.png"))
}

#[async_trait]
impl AcquisitionStrategy for ScreenshotCapture {
    fn name(&self) -> &'static str {
        "screenshot"
    }

    fn kind(&self) -> AcquiredVia {
        AcquiredVia::Screenshot
    }

    async fn acquire(&self, request: &AcquisitionRequest) -> Result<ProductData, ProductError> {
        let asin = request.asin.as_ref().ok_or_else(|| {
            ProductError::InvalidInput("screenshot capture requires an ASIN".to_string())
        })?;
        let url = request
            .product_url()
            .unwrap_or_else(|| asin.product_url());

        let result = tokio::time::timeout(self.timeout, self.capture(&url, asin.as_str())).await;
        let (path, title) = match result {
            Ok(inner) => inner?,
            Err(_) => return Err(ProductError::Timeout(self.timeout.as_secs())),
        };

        Ok(ProductData {
            asin: asin.as_str().to_string(),
            title: title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Product {asin}")),
            price: None,
            brand: None,
            features: Vec::new(),
            image_url: Some(format!("file://{}", path.display())),
            affiliate_url: with_affiliate_tag(&url, request.affiliate_tag.as_deref()),
            source_url: url,
            acquired_via: AcquiredVia::Screenshot,
        })
    }
}
