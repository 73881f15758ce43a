//! In-memory stores for tests and dry runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{IngestError, Result};
use crate::traits::store::{cosine_similarity, RecordStore, VectorIndex};
use crate::types::{
    item::ScrapedItem,
    record::{InsertOutcome, PersistedRecord, VectorEntry, VectorMatch},
};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Records {
    rows: Vec<PersistedRecord>,
    by_key: HashMap<String, i64>,
}

/// Relational store backed by a `Vec`, with the same idempotent-insert
/// behavior as the Postgres store.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Records>,
    failing_urls: RwLock<HashSet<String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts of this URL fail.
    pub fn fail_on_url(self, url: impl Into<String>) -> Self {
        write(&self.failing_urls).insert(url.into());
        self
    }

    pub fn records(&self) -> Vec<PersistedRecord> {
        read(&self.records).rows.clone()
    }

    pub fn len(&self) -> usize {
        read(&self.records).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, brand: &str, item: &ScrapedItem) -> Result<InsertOutcome> {
        if read(&self.failing_urls).contains(&item.url) {
            return Err(IngestError::Storage(
                format!("injected insert failure for {}", item.url).into(),
            ));
        }

        let doc_key = item.doc_key();
        let mut records = write(&self.records);
        if let Some(id) = records.by_key.get(&doc_key) {
            return Ok(InsertOutcome::Existing(*id));
        }

        let id = records.rows.len() as i64 + 1;
        records.rows.push(PersistedRecord {
            id,
            doc_key: doc_key.clone(),
            brand: brand.to_string(),
            url: item.url.clone(),
            product: item.product.clone(),
            category: item.category.clone(),
            issue: item.issue.clone(),
            solution: item.solution.clone(),
            depth: item.depth as i32,
            created_at: Utc::now(),
        });
        records.by_key.insert(doc_key, id);
        Ok(InsertOutcome::Inserted(id))
    }

    async fn get(&self, id: i64) -> Result<Option<PersistedRecord>> {
        Ok(read(&self.records).rows.iter().find(|r| r.id == id).cloned())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}

/// Vector index backed by a `HashMap`, scored with cosine similarity.
#[derive(Default)]
pub struct MemoryVectorIndex {
    entries: RwLock<HashMap<String, VectorEntry>>,
    fail_upserts: RwLock<usize>,
    upsert_calls: RwLock<Vec<usize>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` upsert calls fail.
    pub fn fail_next_upserts(&self, n: usize) {
        *write(&self.fail_upserts) = n;
    }

    /// Batch sizes of every upsert call, in order.
    pub fn upsert_batches(&self) -> Vec<usize> {
        read(&self.upsert_calls).clone()
    }

    pub fn get(&self, id: &str) -> Option<VectorEntry> {
        read(&self.entries).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<u64> {
        write(&self.upsert_calls).push(entries.len());
        {
            let mut remaining = write(&self.fail_upserts);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(IngestError::VectorIndex("injected upsert failure".into()));
            }
        }

        let mut map = write(&self.entries);
        for entry in entries {
            map.insert(entry.id.clone(), entry.clone());
        }
        Ok(entries.len() as u64)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let map = read(&self.entries);
        let mut matches: Vec<VectorMatch> = map
            .values()
            .map(|e| VectorMatch {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.values),
                metadata: e.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}
