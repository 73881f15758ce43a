//! Semantic lookup over the vector index, joined to full records.

use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::{Embedder, RecordStore, VectorIndex};
use crate::types::QueryHit;

/// When to load the full record behind a vector match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchRecords {
    Never,
    /// Only when the metadata copy of the solution was clipped.
    #[default]
    WhenTruncated,
    Always,
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub fetch_records: FetchRecords,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 2,
            fetch_records: FetchRecords::default(),
        }
    }
}

impl QueryOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_fetch_records(mut self, fetch: FetchRecords) -> Self {
        self.fetch_records = fetch;
        self
    }
}

/// Embeds a question and returns the nearest stored documents.
pub struct QueryClient<'a, E: ?Sized, V: ?Sized, R: ?Sized> {
    embedder: &'a E,
    index: &'a V,
    records: &'a R,
}

impl<'a, E, V, R> QueryClient<'a, E, V, R>
where
    E: Embedder + ?Sized,
    V: VectorIndex + ?Sized,
    R: RecordStore + ?Sized,
{
    pub fn new(embedder: &'a E, index: &'a V, records: &'a R) -> Self {
        Self {
            embedder,
            index,
            records,
        }
    }

    /// Top matches by descending score. A blank query returns nothing.
    pub async fn query(&self, text: &str, options: &QueryOptions) -> Result<Vec<QueryHit>> {
        if text.trim().is_empty() || options.top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(text).await?;
        let matches = self.index.query(&vector, options.top_k).await?;
        debug!(query = %text, matches = matches.len(), "Vector query");

        let mut hits = Vec::with_capacity(matches.len());
        for m in matches {
            let wanted = match options.fetch_records {
                FetchRecords::Never => false,
                FetchRecords::WhenTruncated => m.metadata.solution_truncated,
                FetchRecords::Always => true,
            };

            let record = match (wanted, m.metadata.db_id) {
                (true, Some(id)) => match self.records.get(id).await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(id, error = %e, "Record lookup failed, using metadata text");
                        None
                    }
                },
                _ => None,
            };
            hits.push(QueryHit { vector: m, record });
        }

        hits.sort_by(|a, b| {
            b.vector
                .score
                .partial_cmp(&a.vector.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }
}
