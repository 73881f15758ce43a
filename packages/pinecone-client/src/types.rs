use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Metadata attached to a vector. Values must be strings, numbers, booleans
/// or lists of strings.
pub type Metadata = Map<String, Value>;

/// A vector record for upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vector {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertRequest<'a> {
    pub vectors: &'a [Vector],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    pub upserted_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest<'a> {
    pub vector: &'a [f32],
    #[serde(rename = "topK")]
    pub top_k: u32,
    #[serde(rename = "includeMetadata")]
    pub include_metadata: bool,
    #[serde(rename = "includeValues")]
    pub include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<&'a str>,
}

/// One nearest-neighbor match.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredVector {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub matches: Vec<ScoredVector>,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexStatus {
    pub ready: bool,
    pub state: String,
}

/// Control-plane description of an index.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexModel {
    pub name: String,
    pub dimension: u32,
    pub metric: String,
    pub host: String,
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerlessSpec {
    pub cloud: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSpec {
    pub serverless: ServerlessSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateIndexRequest {
    pub name: String,
    pub dimension: u32,
    pub metric: String,
    pub spec: IndexSpec,
}

impl CreateIndexRequest {
    /// Serverless index with cosine metric.
    pub fn serverless(
        name: impl Into<String>,
        dimension: u32,
        cloud: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: "cosine".to_string(),
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: cloud.into(),
                    region: region.into(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceSummary {
    #[serde(rename = "vectorCount", default)]
    pub vector_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexStats {
    #[serde(default)]
    pub dimension: u32,
    #[serde(rename = "totalVectorCount", default)]
    pub total_vector_count: u64,
    #[serde(default)]
    pub namespaces: HashMap<String, NamespaceSummary>,
}
