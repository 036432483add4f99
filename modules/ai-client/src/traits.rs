use async_trait::async_trait;

use crate::error::Result;

/// Chat completion against an OpenAI-compatible endpoint. The caller owns
/// prompt construction and response parsing; this seam only moves text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Text embedding with a fixed output dimension decided by the provider.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
