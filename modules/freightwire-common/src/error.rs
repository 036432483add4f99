use thiserror::Error;

/// Error taxonomy shared across the pipeline. Duplicate detection is NOT an
/// error — it is the `DedupOutcome` value in `types`.
#[derive(Debug, Error)]
pub enum FreightError {
    /// Transport, DNS, or timeout failure on an outbound call.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed feed, HTML, or JSON from a publisher.
    #[error("parse error: {0}")]
    Parse(String),

    /// Schema or enum violation, typically from an LLM response.
    #[error("validation error: {0}")]
    Validation(String),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(String),

    /// Startup-only, fatal.
    #[error("config error: {0}")]
    Config(String),

    /// A bounded queue or connection registry is full.
    #[error("capacity exceeded: {0}")]
    Capacity(String),
}

impl FreightError {
    pub fn network(e: impl std::fmt::Display) -> Self {
        Self::Network(e.to_string())
    }

    pub fn parse(e: impl std::fmt::Display) -> Self {
        Self::Parse(e.to_string())
    }

    pub fn validation(e: impl std::fmt::Display) -> Self {
        Self::Validation(e.to_string())
    }

    pub fn store(e: impl std::fmt::Display) -> Self {
        Self::Store(e.to_string())
    }

    /// True for failures worth one retry: the caller cannot tell a flaky
    /// socket from a hard refusal, so only Network qualifies.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, FreightError>;
