//! Pure Pinecone REST API client.
//!
//! Covers the small surface a loader needs: describe/create an index on the
//! control plane, then upsert and query vectors on the index's data-plane host.
//!
//! # Example
//!
//! ```rust,ignore
//! use pinecone_client::{PineconeClient, Vector};
//!
//! let client = PineconeClient::new("pc-key");
//! let index = client.describe_index("troubleshooter-index").await?.unwrap();
//! let client = client.with_host(index.host);
//!
//! client.upsert(&[Vector { id: "a".into(), values: vec![0.1; 1536], metadata: None }]).await?;
//! let matches = client.query(&vec![0.1; 1536], 2).await?.matches;
//! ```

pub mod error;
pub mod types;

pub use error::{PineconeError, Result};
pub use types::{
    CreateIndexRequest, IndexModel, IndexStats, Metadata, QueryResponse, ScoredVector, Vector,
};

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use types::{QueryRequest, UpsertRequest, UpsertResponse};

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

#[derive(Clone)]
pub struct PineconeClient {
    client: reqwest::Client,
    api_key: String,
    control_url: String,
    host: Option<String>,
    namespace: Option<String>,
}

impl PineconeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            control_url: CONTROL_PLANE_URL.to_string(),
            host: None,
            namespace: None,
        }
    }

    /// Set the data-plane host of the index (as returned by `describe_index`).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(normalize_host(&host.into()));
        self
    }

    /// Scope upserts and queries to a namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Override the control-plane URL (proxies, local emulators).
    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn data_url(&self, path: &str) -> Result<String> {
        let host = self.host.as_deref().ok_or(PineconeError::NoHost)?;
        Ok(format!("{}{}", host, path))
    }

    async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status = %status, error = %message, "Pinecone API error");
            return Err(PineconeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }

    /// Describe an index. Returns `None` when the index does not exist.
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexModel>> {
        let url = format!("{}/indexes/{}", self.control_url, name);
        let resp = self.authed(self.client.get(&url)).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(index = name, "Pinecone index not found");
            return Ok(None);
        }
        Self::read_json(resp).await.map(Some)
    }

    pub async fn create_index(&self, request: &CreateIndexRequest) -> Result<IndexModel> {
        let url = format!("{}/indexes", self.control_url);
        let resp = self
            .authed(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    /// Upsert vectors in a single request. Returns the upserted count.
    pub async fn upsert(&self, vectors: &[Vector]) -> Result<u64> {
        let url = self.data_url("/vectors/upsert")?;
        let body = UpsertRequest {
            vectors,
            namespace: self.namespace.as_deref(),
        };
        let resp = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        let parsed: UpsertResponse = Self::read_json(resp).await?;
        debug!(count = parsed.upserted_count, "Pinecone upsert");
        Ok(parsed.upserted_count)
    }

    /// Nearest-neighbor query with metadata included.
    pub async fn query(&self, vector: &[f32], top_k: u32) -> Result<QueryResponse> {
        let url = self.data_url("/query")?;
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };
        let resp = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        Self::read_json(resp).await
    }

    pub async fn describe_index_stats(&self) -> Result<IndexStats> {
        let url = self.data_url("/describe_index_stats")?;
        let resp = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::read_json(resp).await
    }
}

/// Data-plane hosts come back without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}
