use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use forager_client::{HttpLinkProbe, MarketplaceApi, PaapiConfig, PageScraper};
use forager_core::asin::{Asin, ImageSize};
use forager_core::cache::ResultCache;
use forager_core::config::PipelineConfig;
use forager_core::product::{AcquisitionOutcome, AcquisitionRequest};
use forager_core::resolver::{PlaceholderStrategy, Resolver};
use forager_core::traits::{AcquisitionStrategy, LinkProbe};

#[derive(Parser)]
#[command(name = "forager", version, about = "Affiliate product pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one product through the full acquisition chain
    Resolve {
        /// Marketplace product identifier (10 uppercase alphanumerics)
        #[arg(short, long, conflicts_with = "url")]
        asin: Option<String>,

        /// Product page URL (ASIN is extracted from the /dp/ segment)
        #[arg(short, long)]
        url: Option<String>,

        /// Affiliate tag to stamp on the returned link
        #[arg(short, long, env = "FORAGER_AFFILIATE_TAG")]
        tag: Option<String>,
    },

    /// Probe an affiliate link and report its status
    CheckLink {
        /// URL to probe
        #[arg(short, long)]
        url: String,
    },

    /// Print the deterministic image URL for an ASIN
    ImageUrl {
        /// Marketplace product identifier
        #[arg(short, long)]
        asin: String,

        /// Image size variant
        #[arg(short, long, value_enum, default_value_t = SizeArg::Medium)]
        size: SizeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SizeArg {
    Small,
    Medium,
    Large,
}

impl From<SizeArg> for ImageSize {
    fn from(s: SizeArg) -> Self {
        match s {
            SizeArg::Small => ImageSize::Small,
            SizeArg::Medium => ImageSize::Medium,
            SizeArg::Large => ImageSize::Large,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays clean JSON for piping.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("forager=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve { asin, url, tag } => cmd_resolve(asin, url, tag).await,
        Commands::CheckLink { url } => cmd_check_link(&url).await,
        Commands::ImageUrl { asin, size } => {
            let asin = Asin::parse(&asin).map_err(|e| anyhow!(e))?;
            println!("{}", asin.image_url(size.into()));
            Ok(())
        }
    }
}

async fn cmd_resolve(asin: Option<String>, url: Option<String>, tag: Option<String>) -> Result<()> {
    let mut request = match (asin, url) {
        (Some(asin), _) => {
            AcquisitionRequest::for_asin(Asin::parse(&asin).map_err(|e| anyhow!(e))?)
        }
        (None, Some(url)) => AcquisitionRequest::for_url(url),
        (None, None) => return Err(anyhow!("provide --asin or --url")),
    };
    request.affiliate_tag = tag;

    let config = PipelineConfig::from_env().map_err(|e| anyhow!(e))?;

    let mut strategies: Vec<Arc<dyn AcquisitionStrategy>> = Vec::new();
    if let Some(paapi_config) = PaapiConfig::from_env().map_err(|e| anyhow!(e))? {
        strategies.push(Arc::new(
            MarketplaceApi::new(paapi_config, config.fetch_timeout).map_err(|e| anyhow!(e))?,
        ));
    }
    strategies.push(Arc::new(
        PageScraper::new(config.fetch_timeout).map_err(|e| anyhow!(e))?,
    ));
    strategies.push(Arc::new(PlaceholderStrategy));

    let resolver = Resolver::new(
        strategies,
        ResultCache::new(config.cache_ttl, config.failure_ttl),
    );

    match resolver.resolve(&request).await {
        AcquisitionOutcome::Success(product) => {
            tracing::info!(via = %product.acquired_via, "resolved");
            println!("{}", serde_json::to_string_pretty(&product)?);
            Ok(())
        }
        AcquisitionOutcome::Failure(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Err(anyhow!("resolution failed: {}", report.error.message))
        }
    }
}

async fn cmd_check_link(url: &str) -> Result<()> {
    let probe = HttpLinkProbe::new().map_err(|e| anyhow!(e))?;
    let check = tokio::time::timeout(Duration::from_secs(15), probe.check(url))
        .await
        .map_err(|_| anyhow!("link check timed out"))?
        .map_err(|e| anyhow!(e))?;

    println!("{}", serde_json::to_string_pretty(&check)?);
    if check.valid {
        Ok(())
    } else {
        Err(anyhow!("link is dead (HTTP {})", check.status_code))
    }
}
