//! Pinecone vector index.

use async_trait::async_trait;
use pinecone_client::{CreateIndexRequest, IndexModel, PineconeClient, Vector};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::error::{ConfigError, ConfigResult, IngestError, Result};
use crate::traits::store::VectorIndex;
use crate::types::record::{VectorEntry, VectorMatch, VectorMetadata};

const READY_POLLS: u32 = 30;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How to find or create the index.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: u32,
    pub cloud: String,
    pub region: String,
}

impl IndexSpec {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            name: settings.pinecone_index.clone(),
            dimension: settings.embedding_dimension,
            cloud: settings.pinecone_cloud.clone(),
            region: settings.pinecone_region.clone(),
        }
    }
}

/// Pinecone-backed [`VectorIndex`].
pub struct PineconeVectorIndex {
    client: PineconeClient,
}

impl PineconeVectorIndex {
    /// Wrap a client that already knows its data-plane host.
    pub fn new(client: PineconeClient) -> Self {
        Self { client }
    }

    /// Ensure the index exists with the configured dimension, then connect
    /// to its data plane. An explicit `PINECONE_HOST` wins over the host the
    /// control plane reports.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let client = PineconeClient::new(settings.pinecone_api_key.expose());
        let spec = IndexSpec::from_settings(settings);
        let model = ensure_index(&client, &spec).await?;

        let host = settings
            .pinecone_host
            .clone()
            .unwrap_or_else(|| model.host.clone());
        info!(index = %spec.name, host = %host, dimension = spec.dimension, "Vector index ready");
        Ok(Self::new(client.with_host(host)))
    }
}

/// Describe the index, creating it when missing. A dimension mismatch is a
/// configuration error; the existing index is left alone.
pub async fn ensure_index(client: &PineconeClient, spec: &IndexSpec) -> Result<IndexModel> {
    if let Some(model) = client.describe_index(&spec.name).await? {
        check_dimension(&model, spec)?;
        debug!(index = %spec.name, "Using existing index");
        return Ok(model);
    }

    info!(
        index = %spec.name,
        dimension = spec.dimension,
        cloud = %spec.cloud,
        region = %spec.region,
        "Creating vector index"
    );
    let request = CreateIndexRequest::serverless(&spec.name, spec.dimension, &spec.cloud, &spec.region);
    let mut model = client.create_index(&request).await?;

    for _ in 0..READY_POLLS {
        if model.status.ready && !model.host.is_empty() {
            return Ok(model);
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
        if let Some(latest) = client.describe_index(&spec.name).await? {
            model = latest;
        }
    }

    warn!(index = %spec.name, state = %model.status.state, "Index not ready yet, continuing");
    Ok(model)
}

fn check_dimension(model: &IndexModel, spec: &IndexSpec) -> ConfigResult<()> {
    if model.dimension != spec.dimension {
        return Err(ConfigError::DimensionMismatch {
            name: model.name.clone(),
            actual: model.dimension,
            expected: spec.dimension,
        });
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for PineconeVectorIndex {
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<u64> {
        let vectors: Vec<Vector> = entries
            .iter()
            .map(|e| Vector {
                id: e.id.clone(),
                values: e.values.clone(),
                metadata: Some(e.metadata.to_map()),
            })
            .collect();
        Ok(self.client.upsert(&vectors).await?)
    }

    #[instrument(skip(self, vector))]
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let top_k = u32::try_from(top_k).map_err(|_| {
            IngestError::Config(ConfigError::InvalidValue {
                name: "top_k".into(),
                reason: "too large".into(),
            })
        })?;
        let response = self.client.query(vector, top_k).await?;
        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: VectorMetadata::from_map(m.metadata.unwrap_or_default()),
            })
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.client.describe_index_stats().await?.total_vector_count)
    }
}
