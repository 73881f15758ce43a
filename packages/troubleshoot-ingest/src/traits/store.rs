//! Storage traits for full-length records and vectors.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    item::ScrapedItem,
    record::{InsertOutcome, PersistedRecord, VectorEntry, VectorMatch},
};

/// Relational store for untruncated records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert an item under a brand tag, keyed by its document key.
    ///
    /// Inserting an item whose key already exists leaves the row untouched
    /// and returns [`InsertOutcome::Existing`]. Each insert commits on its own.
    async fn insert(&self, brand: &str, item: &ScrapedItem) -> Result<InsertOutcome>;

    async fn get(&self, id: i64) -> Result<Option<PersistedRecord>>;

    async fn count(&self) -> Result<u64>;
}

/// Nearest-neighbor vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Write entries; an existing id is overwritten. Returns the count written.
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<u64>;

    /// Top-k matches by descending score.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>>;

    async fn count(&self) -> Result<u64>;
}

/// Cosine similarity of two vectors. Zero when lengths differ or either is
/// the zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
