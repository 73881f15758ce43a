//! Relational insert, embedding, and batched vector upsert.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::traits::{Embedder, RecordStore, VectorIndex};
use crate::types::{
    record::{VectorEntry, VectorMetadata},
    DiscardReason, FailureKind, ItemOutcome, ScrapedItem, Stage,
};

/// Default ceiling for one vector's serialized metadata, in bytes.
pub const DEFAULT_MAX_METADATA_BYTES: usize = 40_000;

#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Vectors per upsert call.
    pub batch_size: usize,
    /// Pause between upsert calls.
    pub batch_pause: Duration,
    /// Ceiling for one vector's serialized metadata.
    pub max_metadata_bytes: usize,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_pause: Duration::from_secs(1),
            max_metadata_bytes: DEFAULT_MAX_METADATA_BYTES,
        }
    }
}

impl PersistConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn with_max_metadata_bytes(mut self, max: usize) -> Self {
        self.max_metadata_bytes = max;
        self
    }
}

/// Outcomes of one persist call.
#[derive(Debug, Default)]
pub struct PersistResult {
    pub outcomes: Vec<(String, ItemOutcome)>,
    pub vectors_upserted: u64,
}

/// A vector waiting for its batch.
struct Pending {
    url: String,
    record_id: i64,
    entry: VectorEntry,
}

/// Writes accepted items to the record store and the vector index.
#[derive(Debug, Clone, Default)]
pub struct Persister {
    config: PersistConfig,
}

impl Persister {
    pub fn new(config: PersistConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Persist items under a brand tag.
    ///
    /// Every item ends with exactly one outcome; no single failure stops the
    /// rest. Rows and vectors share the item's document key, so running this
    /// twice on the same items writes nothing new.
    pub async fn persist<R, E, V>(
        &self,
        records: &R,
        embedder: &E,
        index: &V,
        brand: &str,
        items: Vec<ScrapedItem>,
    ) -> PersistResult
    where
        R: RecordStore + ?Sized,
        E: Embedder + ?Sized,
        V: VectorIndex + ?Sized,
    {
        let mut result = PersistResult::default();
        let mut pending = Vec::new();

        for item in items {
            if item.is_empty() {
                result
                    .outcomes
                    .push((item.url, ItemOutcome::discarded(DiscardReason::Empty)));
                continue;
            }
            let text = item.embedding_text();
            if text.trim().is_empty() {
                result
                    .outcomes
                    .push((item.url, ItemOutcome::discarded(DiscardReason::NothingToEmbed)));
                continue;
            }

            let record_id = match records.insert(brand, &item).await {
                Ok(outcome) => outcome.id(),
                Err(e) => {
                    warn!(url = %item.url, error = %e, "Insert failed");
                    let outcome = ItemOutcome::failed(Stage::Insert, FailureKind::of(&e), e.to_string());
                    result.outcomes.push((item.url, outcome));
                    continue;
                }
            };

            let values = match embedder.embed(&text).await {
                Ok(values) => values,
                Err(e) => {
                    warn!(url = %item.url, error = %e, "Embedding failed");
                    let outcome = ItemOutcome::failed(Stage::Embed, FailureKind::of(&e), e.to_string());
                    result.outcomes.push((item.url, outcome));
                    continue;
                }
            };

            let metadata = VectorMetadata::for_item(
                brand,
                &item,
                Some(record_id),
                self.config.max_metadata_bytes,
            );
            if metadata.solution_truncated {
                debug!(url = %item.url, bytes = item.solution.len(), "Solution truncated in metadata");
            }

            pending.push(Pending {
                entry: VectorEntry {
                    id: item.doc_key(),
                    values,
                    metadata,
                },
                url: item.url,
                record_id,
            });
        }

        let batch_size = self.config.batch_size.max(1);
        let batches = pending.len().div_ceil(batch_size);
        for (i, batch) in pending.chunks(batch_size).enumerate() {
            if i > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            let entries: Vec<VectorEntry> = batch.iter().map(|p| p.entry.clone()).collect();
            match index.upsert(&entries).await {
                Ok(count) => {
                    debug!(batch = i + 1, of = batches, count, "Upserted batch");
                    result.vectors_upserted += count;
                    for p in batch {
                        result.outcomes.push((
                            p.url.clone(),
                            ItemOutcome::Persisted {
                                record_id: p.record_id,
                                vector_id: p.entry.id.clone(),
                            },
                        ));
                    }
                }
                Err(e) => {
                    warn!(batch = i + 1, of = batches, error = %e, "Upsert batch failed");
                    let kind = FailureKind::of(&e);
                    for p in batch {
                        result.outcomes.push((
                            p.url.clone(),
                            ItemOutcome::failed(Stage::Upsert, kind, e.to_string()),
                        ));
                    }
                }
            }
        }

        info!(
            brand,
            vectors = result.vectors_upserted,
            outcomes = result.outcomes.len(),
            "Persist complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{MemoryRecordStore, MemoryVectorIndex};
    use crate::testing::MockEmbedder;

    fn fast() -> Persister {
        Persister::new(PersistConfig::default().with_batch_pause(Duration::ZERO))
    }

    fn items(n: usize) -> Vec<ScrapedItem> {
        (0..n)
            .map(|i| ScrapedItem::new(format!("https://kb.example.com/{i}")).with_issue(format!("Issue {i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_persist_is_idempotent() {
        let records = MemoryRecordStore::new();
        let index = MemoryVectorIndex::new();
        let embedder = MockEmbedder::new(8);

        let first = fast().persist(&records, &embedder, &index, "Control4", items(3)).await;
        let second = fast().persist(&records, &embedder, &index, "Control4", items(3)).await;

        assert_eq!(first.vectors_upserted, 3);
        assert_eq!(second.vectors_upserted, 3);
        assert_eq!(records.len(), 3);
        assert_eq!(index.len(), 3);
        assert_eq!(first.outcomes, second.outcomes);
    }

    #[tokio::test]
    async fn test_batches_of_configured_size() {
        let records = MemoryRecordStore::new();
        let index = MemoryVectorIndex::new();
        let embedder = MockEmbedder::new(4);
        let persister = Persister::new(
            PersistConfig::default()
                .with_batch_size(2)
                .with_batch_pause(Duration::ZERO),
        );

        persister.persist(&records, &embedder, &index, "X", items(5)).await;
        assert_eq!(index.upsert_batches(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_truncation_keeps_full_record() {
        let records = MemoryRecordStore::new();
        let index = MemoryVectorIndex::new();
        let embedder = MockEmbedder::new(4);
        let solution = "é".repeat(30_000);
        let item = ScrapedItem::new("https://kb.example.com/long")
            .with_issue("Long manual")
            .with_solution(solution.clone());

        let result = fast()
            .persist(&records, &embedder, &index, "SnapOne", vec![item.clone()])
            .await;

        let vector_id = match &result.outcomes[0].1 {
            ItemOutcome::Persisted { vector_id, .. } => vector_id.clone(),
            other => panic!("unexpected outcome: {other:?}"),
        };
        let entry = index.get(&vector_id).unwrap();
        assert!(entry.metadata.payload_len() <= 40_000);
        assert!(entry.metadata.solution.len() > 39_000);
        assert!(solution.starts_with(&entry.metadata.solution));
        assert!(entry.metadata.solution_truncated);
        assert_eq!(entry.metadata.db_id, Some(1));
        assert_eq!(records.records()[0].solution, solution);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let records = MemoryRecordStore::new().fail_on_url("https://kb.example.com/1");
        let index = MemoryVectorIndex::new();
        let embedder = MockEmbedder::new(4).with_failure_for("Issue 2");

        let result = fast().persist(&records, &embedder, &index, "X", items(4)).await;

        let stage_of = |url: &str| {
            result
                .outcomes
                .iter()
                .find(|(u, _)| u == url)
                .map(|(_, o)| o.clone())
                .unwrap()
        };
        assert!(matches!(
            stage_of("https://kb.example.com/1"),
            ItemOutcome::Failed { stage: Stage::Insert, .. }
        ));
        assert!(matches!(
            stage_of("https://kb.example.com/2"),
            ItemOutcome::Failed { stage: Stage::Embed, .. }
        ));
        assert!(stage_of("https://kb.example.com/0").is_persisted());
        assert!(stage_of("https://kb.example.com/3").is_persisted());
        // Row for the embed failure stays committed.
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_batch_marks_its_items() {
        let records = MemoryRecordStore::new();
        let index = MemoryVectorIndex::new();
        index.fail_next_upserts(1);
        let embedder = MockEmbedder::new(4);
        let persister = Persister::new(
            PersistConfig::default()
                .with_batch_size(2)
                .with_batch_pause(Duration::ZERO),
        );

        let result = persister.persist(&records, &embedder, &index, "X", items(3)).await;

        let upsert_failures = result
            .outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Failed { stage: Stage::Upsert, .. }))
            .count();
        assert_eq!(upsert_failures, 2);
        assert_eq!(result.vectors_upserted, 1);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_item_refused() {
        let records = MemoryRecordStore::new();
        let index = MemoryVectorIndex::new();
        let embedder = MockEmbedder::new(4);
        let item = ScrapedItem::new("https://kb.example.com/e").with_category("PDF Document");

        let result = fast().persist(&records, &embedder, &index, "X", vec![item]).await;

        assert_eq!(result.outcomes[0].1, ItemOutcome::discarded(DiscardReason::Empty));
        assert!(records.is_empty());
    }
}
