//! End-to-end flow through normalize → fingerprint → dedup, without a
//! database: the URL level uses an in-memory lookup, the SimHash and MinHash
//! levels run against the real in-process index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use freightwire_common::{DedupOutcome, DuplicateReason, Result};
use freightwire_ingest::fingerprint::{canonicalize_url, minhash128, simhash64};
use freightwire_ingest::normalize;
use freightwire_ingest::{DedupConfig, Deduplicator, FingerprintIndex, UrlLookup};
use uuid::Uuid;

#[derive(Default)]
struct MemoryUrls(Mutex<HashMap<String, Uuid>>);

#[async_trait]
impl UrlLookup for MemoryUrls {
    async fn find_article_id_by_url(&self, url: &str) -> Result<Option<Uuid>> {
        Ok(self.0.lock().unwrap().get(url).copied())
    }
}

struct Harness {
    urls: Arc<MemoryUrls>,
    dedup: Deduplicator<Arc<MemoryUrls>>,
}

impl Harness {
    fn new() -> Self {
        let urls = Arc::new(MemoryUrls::default());
        let index = Arc::new(RwLock::new(FingerprintIndex::new()));
        let dedup = Deduplicator::new(urls.clone(), index, DedupConfig::default());
        Self { urls, dedup }
    }

    /// Ingest one article the way the scheduler does: canonicalize,
    /// normalize, fingerprint, check, record.
    async fn ingest(&self, raw_url: &str, title: &str, body: &str) -> DedupOutcome {
        let url = canonicalize_url(raw_url).unwrap();
        let title = normalize::clean_title(title);
        let body = normalize::clean_text(body);
        let simhash = simhash64(&title);
        let minhash = minhash128(&body);

        let outcome = self.dedup.check(&url, simhash, &minhash).await.unwrap();
        if outcome == DedupOutcome::Unique {
            let id = Uuid::new_v4();
            self.urls.0.lock().unwrap().insert(url, id);
            self.dedup.record(id, simhash, minhash);
        }
        outcome
    }
}

const BODY_A: &str = "Spot rates on the transpacific trade jumped twelve percent this week \
    as congestion at gateway ports worsened and carriers withdrew capacity from the lane.";

const BODY_B: &str = "European rail freight volumes recovered in June after the end of the \
    strike, with intermodal operators reporting near-normal schedules across corridors.";

#[tokio::test]
async fn unique_articles_pass_and_persist() {
    let harness = Harness::new();
    assert_eq!(
        harness
            .ingest(
                "https://theloadstar.com/a?utm_source=twitter",
                "Global shipping rates surge amid port congestion",
                BODY_A,
            )
            .await,
        DedupOutcome::Unique
    );
    assert_eq!(
        harness
            .ingest(
                "https://railnews.example.com/2026/06/rail-recovery",
                "European rail freight recovers after strike",
                BODY_B,
            )
            .await,
        DedupOutcome::Unique
    );
}

#[tokio::test]
async fn dedup_is_monotonic_on_url() {
    let harness = Harness::new();
    harness
        .ingest("https://theloadstar.com/a?utm_source=twitter", "T1", BODY_A)
        .await;

    // Tracking params differ, canonical URL does not.
    let outcome = harness
        .ingest("https://theloadstar.com/a?utm_source=rss", "Totally different title", BODY_B)
        .await;
    assert!(matches!(
        outcome,
        DedupOutcome::DuplicateOf {
            reason: DuplicateReason::UrlExact,
            ..
        }
    ));
}

#[tokio::test]
async fn cross_source_same_title_is_rejected() {
    let harness = Harness::new();
    harness
        .ingest(
            "https://source-one.example.com/2026/07/rates",
            "Global shipping rates surge amid port congestion",
            BODY_A,
        )
        .await;

    // Same headline syndicated by a second publisher, different URL and a
    // lightly edited body.
    let outcome = harness
        .ingest(
            "https://source-two.example.com/news/rates-surge",
            "Global shipping rates surge amid port congestion",
            "Spot rates on the transpacific trade jumped this week as congestion worsened.",
        )
        .await;
    assert!(matches!(
        outcome,
        DedupOutcome::DuplicateOf {
            reason: DuplicateReason::TitleSimhash,
            ..
        }
    ));
}

#[tokio::test]
async fn republished_body_is_rejected_by_content() {
    let harness = Harness::new();
    harness
        .ingest(
            "https://source-one.example.com/2026/07/rates",
            "Global shipping rates surge amid port congestion",
            BODY_A,
        )
        .await;

    // Different headline, near-identical body text.
    let outcome = harness
        .ingest(
            "https://aggregator.example.com/item/9981",
            "Transpacific update: carriers pull capacity",
            BODY_A,
        )
        .await;
    assert!(matches!(
        outcome,
        DedupOutcome::DuplicateOf {
            reason: DuplicateReason::ContentMinhash,
            ..
        }
    ));
}
