use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    /// Transport-level failure: DNS, connect, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response from the provider.
    #[error("provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    /// 2xx response with no usable content.
    #[error("empty response from provider")]
    Empty,
}

impl AiError {
    /// Network failures, 5xx, and 429 are worth a retry; everything else
    /// (auth, bad request) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Transport(_) => true,
            AiError::Provider { status, .. } => *status == 429 || *status >= 500,
            AiError::Empty => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        AiError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AiError>;
