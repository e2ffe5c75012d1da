pub mod asin;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod job;
pub mod product;
pub mod queue;
pub mod resolver;
pub mod sync;
pub mod testutil;
pub mod traits;
pub mod worker;

pub use asin::{Asin, ImageSize, with_affiliate_tag};
pub use cache::ResultCache;
pub use config::PipelineConfig;
pub use error::{ClassifiedError, ErrorCategory, ProductError, RecoveryPolicy, classify};
pub use health::{AlertRegistry, ComponentStatus, HealthAggregator, HealthSnapshot};
pub use job::{JobItem, JobKind, JobStatus, QueueStats};
pub use product::{AcquiredVia, AcquisitionOutcome, AcquisitionRequest, LinkCheck, ProductData};
pub use queue::InMemoryJobQueue;
pub use resolver::{PlaceholderStrategy, Resolver};
pub use traits::{AcquisitionStrategy, CatalogStore, ComponentProbe, LinkProbe};
