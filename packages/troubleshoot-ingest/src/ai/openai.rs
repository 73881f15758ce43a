//! OpenAI-backed classifier and embedder.

use async_trait::async_trait;
use openai_client::{ChatRequest, Message, OpenAIClient, OpenAIError};

use crate::config::{Settings, DEFAULT_CLASSIFIER_MODEL, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL};
use crate::error::{IngestError, Result};
use crate::traits::{Classifier, Embedder};
use crate::types::item::{truncate_chars, EMBEDDING_INPUT_CAP};

/// Wraps the OpenAI client for the pipeline's two model calls.
#[derive(Clone)]
pub struct OpenAIService {
    client: OpenAIClient,
    classifier_model: String,
    embedding_model: String,
    dimension: usize,
}

impl OpenAIService {
    pub fn new(client: OpenAIClient) -> Self {
        Self {
            client,
            classifier_model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION as usize,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(OpenAIClient::new(settings.openai_api_key.expose()))
            .with_classifier_model(&settings.classifier_model)
            .with_embedding_model(&settings.embedding_model, settings.embedding_dimension as usize)
    }

    pub fn with_classifier_model(mut self, model: impl Into<String>) -> Self {
        self.classifier_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embedding_model = model.into();
        self.dimension = dimension;
        self
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(IngestError::Embedding(format!(
                "model {} returned {} dimensions, expected {}",
                self.embedding_model,
                embedding.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

fn map_error(err: OpenAIError, wrap: fn(String) -> IngestError) -> IngestError {
    if err.is_transient() {
        IngestError::ServiceUnavailable(err.to_string())
    } else {
        wrap(err.to_string())
    }
}

#[async_trait]
impl Classifier for OpenAIService {
    async fn classify(&self, instruction: &str, text: &str) -> Result<String> {
        let request = ChatRequest::new(&self.classifier_model)
            .message(Message::system(instruction))
            .message(Message::user(text))
            .temperature(0.0)
            .max_tokens(5);

        let response = self
            .client
            .chat_completion(request)
            .await
            .map_err(|e| map_error(e, IngestError::Classification))?;
        Ok(response.content)
    }
}

#[async_trait]
impl Embedder for OpenAIService {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_chars(text, EMBEDDING_INPUT_CAP);
        let embedding = self
            .client
            .create_embedding(text, &self.embedding_model)
            .await
            .map_err(|e| map_error(e, IngestError::Embedding))?;
        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let capped: Vec<&str> = texts
            .iter()
            .map(|t| truncate_chars(t, EMBEDDING_INPUT_CAP))
            .collect();
        let embeddings = self
            .client
            .create_embeddings(&capped, &self.embedding_model)
            .await
            .map_err(|e| map_error(e, IngestError::Embedding))?;
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }
        Ok(embeddings)
    }
}
