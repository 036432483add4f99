//! Adapter plane: four adapter shapes with one contract. Adapters are pure
//! producers — they never touch the store. A source-level failure is an
//! error; per-entry failures ride along as `partial_errors`.

mod api;
mod feed;
mod scrape;
pub mod universal;

pub use api::ApiAdapter;
pub use feed::FeedAdapter;
pub use scrape::ScrapeAdapter;
pub use universal::UniversalAdapter;

use async_trait::async_trait;
use freightwire_common::{FetchOutcome, Result, Source, SourceKind};

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<FetchOutcome>;
    fn name(&self) -> &'static str;
}

/// All four adapters, wired once at startup.
pub struct AdapterSet {
    pub feed: FeedAdapter,
    pub api: ApiAdapter,
    pub scraper: ScrapeAdapter,
    pub universal: UniversalAdapter,
}

impl AdapterSet {
    pub fn new() -> Self {
        let feed = FeedAdapter::new();
        Self {
            universal: UniversalAdapter::new(feed.clone()),
            api: ApiAdapter::new(),
            scraper: ScrapeAdapter::new(),
            feed,
        }
    }

    pub fn adapter_for(&self, kind: SourceKind) -> &dyn SourceAdapter {
        match kind {
            SourceKind::Feed => &self.feed,
            SourceKind::Api => &self.api,
            SourceKind::Scraper => &self.scraper,
            SourceKind::Universal => &self.universal,
        }
    }
}

impl Default for AdapterSet {
    fn default() -> Self {
        Self::new()
    }
}
