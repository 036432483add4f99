//! Three-level dedup cascade: exact URL, title SimHash, content MinHash via
//! LSH. Stops on the first hit; a duplicate is a normal outcome.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use freightwire_common::{DedupOutcome, DuplicateReason, Result};
use freightwire_store::Store;
use uuid::Uuid;

use crate::lsh::FingerprintIndex;

/// The store-side lookup the cascade needs. Level 1 goes through the unique
/// URL index; levels 2 and 3 run against the in-process fingerprint index.
#[async_trait]
pub trait UrlLookup: Send + Sync {
    async fn find_article_id_by_url(&self, url: &str) -> Result<Option<Uuid>>;
}

#[async_trait]
impl UrlLookup for Store {
    async fn find_article_id_by_url(&self, url: &str) -> Result<Option<Uuid>> {
        Store::find_article_id_by_url(self, url).await
    }
}

#[async_trait]
impl<T: UrlLookup + ?Sized> UrlLookup for Arc<T> {
    async fn find_article_id_by_url(&self, url: &str) -> Result<Option<Uuid>> {
        (**self).find_article_id_by_url(url).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub max_hamming: u32,
    pub min_jaccard: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_hamming: 3,
            min_jaccard: 0.85,
        }
    }
}

pub struct Deduplicator<S> {
    store: S,
    index: Arc<RwLock<FingerprintIndex>>,
    config: DedupConfig,
}

impl<S: UrlLookup> Deduplicator<S> {
    pub fn new(store: S, index: Arc<RwLock<FingerprintIndex>>, config: DedupConfig) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    /// Check a candidate article. `url` must already be canonicalized.
    pub async fn check(
        &self,
        url: &str,
        title_simhash: u64,
        content_minhash: &[u64],
    ) -> Result<DedupOutcome> {
        if let Some(existing) = self.store.find_article_id_by_url(url).await? {
            return Ok(DedupOutcome::DuplicateOf {
                article_id: existing,
                reason: DuplicateReason::UrlExact,
            });
        }

        let index = self.index.read().expect("fingerprint index lock");

        if let Some((existing, _distance)) =
            index.nearest_title(title_simhash, self.config.max_hamming)
        {
            return Ok(DedupOutcome::DuplicateOf {
                article_id: existing,
                reason: DuplicateReason::TitleSimhash,
            });
        }

        for candidate in index.content_candidates(content_minhash) {
            if let Some(estimate) = index.jaccard_with(candidate, content_minhash) {
                if estimate >= self.config.min_jaccard {
                    return Ok(DedupOutcome::DuplicateOf {
                        article_id: candidate,
                        reason: DuplicateReason::ContentMinhash,
                    });
                }
            }
        }

        Ok(DedupOutcome::Unique)
    }

    /// Register a freshly inserted article's fingerprints. Held write-lock is
    /// brief; readers proceed in parallel otherwise.
    pub fn record(&self, id: Uuid, title_simhash: u64, content_minhash: Vec<u64>) {
        self.index
            .write()
            .expect("fingerprint index lock")
            .insert(id, title_simhash, content_minhash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{minhash128, simhash64};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the store's unique URL index.
    struct MemoryUrls(Mutex<HashMap<String, Uuid>>);

    #[async_trait]
    impl UrlLookup for MemoryUrls {
        async fn find_article_id_by_url(&self, url: &str) -> Result<Option<Uuid>> {
            Ok(self.0.lock().unwrap().get(url).copied())
        }
    }

    fn deduplicator() -> (Deduplicator<MemoryUrls>, Arc<RwLock<FingerprintIndex>>) {
        let index = Arc::new(RwLock::new(FingerprintIndex::new()));
        let dedup = Deduplicator::new(
            MemoryUrls(Mutex::new(HashMap::new())),
            index.clone(),
            DedupConfig::default(),
        );
        (dedup, index)
    }

    #[tokio::test]
    async fn url_hit_short_circuits() {
        let (dedup, _) = deduplicator();
        let existing = Uuid::new_v4();
        dedup
            .store
            .0
            .lock()
            .unwrap()
            .insert("https://theloadstar.com/a".to_string(), existing);

        let outcome = dedup
            .check("https://theloadstar.com/a", 0, &[])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DedupOutcome::DuplicateOf {
                article_id: existing,
                reason: DuplicateReason::UrlExact,
            }
        );
    }

    #[tokio::test]
    async fn near_duplicate_title_is_rejected() {
        let (dedup, _) = deduplicator();
        let first = Uuid::new_v4();
        let base = simhash64("Global shipping rates surge amid port congestion");
        dedup.record(first, base, vec![]);

        // Any signature within Hamming distance 3 counts as the same story.
        let outcome = dedup
            .check("https://other.example/b", base ^ 0b11, &[])
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DedupOutcome::DuplicateOf {
                article_id: first,
                reason: DuplicateReason::TitleSimhash,
            }
        );
    }

    #[tokio::test]
    async fn same_body_different_title_hits_minhash() {
        let (dedup, _) = deduplicator();
        let body = "Ocean carriers announced a new round of surcharges on transpacific \
                    lanes effective next month, citing congestion and equipment shortages \
                    at major gateways.";
        let first = Uuid::new_v4();
        dedup.record(first, simhash64("Carriers add surcharges"), minhash128(body));

        let distinct_title = simhash64("A completely different headline about customs rules");
        let outcome = dedup
            .check("https://other.example/c", distinct_title, &minhash128(body))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DedupOutcome::DuplicateOf {
                article_id: first,
                reason: DuplicateReason::ContentMinhash,
            }
        );
    }

    #[tokio::test]
    async fn unique_article_passes() {
        let (dedup, _) = deduplicator();
        dedup.record(
            Uuid::new_v4(),
            simhash64("Rail strike halts intermodal services in Germany"),
            minhash128("Rail freight operators suspended intermodal services after a strike."),
        );

        let outcome = dedup
            .check(
                "https://example.com/air",
                simhash64("Air cargo demand rises out of Vietnam"),
                &minhash128("Forwarders report rising air cargo volumes out of Vietnam this week."),
            )
            .await
            .unwrap();
        assert_eq!(outcome, DedupOutcome::Unique);
    }
}
