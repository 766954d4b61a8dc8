//! The embedding provider seam. The engine only sees [`Embedder`]; the Ollama
//! implementation lives in [`crate::ollama`].

use std::time::Duration;

use async_trait::async_trait;

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Runs `embedder.embed(text)` under `limit`; elapsing is a typed failure.
pub async fn embed_with_timeout(
    embedder: &dyn Embedder,
    text: &str,
    limit: Duration,
) -> Result<Vec<f32>, EmbedError> {
    match tokio::time::timeout(limit, embedder.embed(text)).await {
        Ok(res) => res,
        Err(_) => Err(EmbedError::Timeout(limit)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("provider returned no embedding")]
    Empty,
}
