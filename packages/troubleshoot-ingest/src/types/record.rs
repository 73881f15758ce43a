//! Persisted rows, vector entries and query results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::{truncate_bytes, ScrapedItem};

/// Relational-store row. Created once per accepted item, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: i64,
    pub doc_key: String,
    pub brand: String,
    pub url: String,
    pub product: String,
    pub category: String,
    pub issue: String,
    pub solution: String,
    pub depth: i32,
    pub created_at: DateTime<Utc>,
}

/// Result of inserting an item into the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was created.
    Inserted(i64),
    /// A row with the same document key already existed.
    Existing(i64),
}

impl InsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Existing(id) => *id,
        }
    }
}

/// Metadata stored next to each vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorMetadata {
    pub brand: String,
    pub issue: String,
    pub category: String,
    pub url: String,
    pub product: String,
    /// Possibly truncated copy of the item's solution.
    pub solution: String,
    /// Back-reference to [`PersistedRecord::id`] for the untruncated text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_id: Option<i64>,
    pub solution_truncated: bool,
}

/// Largest share of the payload ceiling one descriptive field may take.
const FIELD_SHARE_DIVISOR: usize = 8;

impl VectorMetadata {
    /// Build metadata for an item whose serialized form fits in
    /// `max_payload_bytes`.
    ///
    /// The descriptive fields are clipped first, each to an eighth of the
    /// ceiling; `solution` gets whatever the rest of the payload leaves.
    pub fn for_item(
        brand: &str,
        item: &ScrapedItem,
        db_id: Option<i64>,
        max_payload_bytes: usize,
    ) -> Self {
        let field_cap = max_payload_bytes / FIELD_SHARE_DIVISOR;
        let clip = |s: &str| truncate_bytes(s, field_cap).to_string();

        let mut meta = Self {
            brand: clip(brand),
            issue: clip(&item.issue),
            category: clip(&item.category),
            url: clip(&item.url),
            product: clip(&item.product),
            solution: String::new(),
            db_id,
            solution_truncated: false,
        };

        // JSON escaping can grow the solution, so shrink until it fits.
        let overhead = meta.payload_len();
        let room = max_payload_bytes.saturating_sub(overhead);
        let mut budget = room;
        loop {
            meta.solution = truncate_bytes(&item.solution, budget).to_string();
            meta.solution_truncated = meta.solution.len() < item.solution.len();
            let len = meta.payload_len();
            let encoded = len.saturating_sub(overhead);
            if len <= max_payload_bytes || budget == 0 || encoded == 0 {
                break;
            }
            budget = (budget * room / encoded).min(budget - 1);
        }
        meta
    }

    /// Size of the metadata as sent to the vector store, in bytes.
    pub fn payload_len(&self) -> usize {
        serde_json::to_vec(&self.to_map())
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Lenient decode: unknown keys are ignored, missing keys default.
    pub fn from_map(mut map: serde_json::Map<String, serde_json::Value>) -> Self {
        // Older loaders stored the back-reference as a string.
        let db_id = map.remove("db_id").and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        });
        let mut meta: Self =
            serde_json::from_value(serde_json::Value::Object(map)).unwrap_or_default();
        meta.db_id = db_id;
        meta
    }
}

/// Vector-store record.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// One nearest-neighbor match.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// A query result: the vector match plus, when fetched, the full record.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub vector: VectorMatch,
    pub record: Option<PersistedRecord>,
}

impl QueryHit {
    /// The best available solution text: the record's when fetched.
    pub fn full_solution(&self) -> &str {
        self.record
            .as_ref()
            .map(|r| r.solution.as_str())
            .unwrap_or(&self.vector.metadata.solution)
    }
}
