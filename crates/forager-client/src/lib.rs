pub mod linkcheck;
pub mod paapi;
pub mod scrape;
pub mod sigv4;

#[cfg(feature = "browser")]
pub mod screenshot;

pub use linkcheck::HttpLinkProbe;
pub use paapi::{MarketplaceApi, PaapiConfig};
pub use scrape::PageScraper;

#[cfg(feature = "browser")]
pub use screenshot::ScreenshotCapture;
