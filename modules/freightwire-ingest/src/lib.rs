//! Collection plane: text normalization, fingerprints, the dedup cascade,
//! the four source adapters, and the fetch scheduler.

pub mod adapters;
pub mod dedup;
pub mod extract;
pub mod fingerprint;
pub mod lsh;
pub mod normalize;
pub mod scheduler;

pub use adapters::{AdapterSet, SourceAdapter};
pub use dedup::{DedupConfig, Deduplicator, UrlLookup};
pub use lsh::FingerprintIndex;
pub use scheduler::{CollectionScheduler, SchedulerConfig};
