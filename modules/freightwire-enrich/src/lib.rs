//! LLM enrichment: prompt construction, tolerant response parsing and
//! validation, embedding, and the bounded worker pool.

pub mod parse;
pub mod pipeline;
pub mod prompt;

pub use pipeline::{EnrichmentConfig, EnrichmentPipeline, EMBEDDING_DIM};
pub use prompt::PROMPT_VERSION;
