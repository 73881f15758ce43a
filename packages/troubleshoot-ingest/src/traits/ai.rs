//! Text-classification and embedding service seams.

use async_trait::async_trait;

use crate::error::Result;

/// Single-call text classification: system instruction plus user text in,
/// a short answer out.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, instruction: &str, text: &str) -> Result<String>;
}

/// Embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed length of every returned vector.
    fn dimension(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
