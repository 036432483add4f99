//! Automatic source discovery: search-assisted candidate generation,
//! validation with quality/relevance scoring, and auto-promotion into the
//! live collection set.

pub mod discovery;
pub mod keywords;
pub mod search;
pub mod validate;

pub use discovery::{DiscoveryConfig, DiscoveryLoop, DiscoveryStatus, ScanSummary};
pub use search::{CustomSearcher, DuckDuckGoSearcher, SearchHit, SearchProvider};
pub use validate::{ValidationOutcome, Validator, AUTO_APPROVE_THRESHOLD};
