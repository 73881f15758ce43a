//! Testing utilities including mock implementations.
//!
//! Useful for exercising the pipeline without network, model, or database
//! access. Pair with [`crate::stores::MemoryRecordStore`] and
//! [`crate::stores::MemoryVectorIndex`].

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{AuthError, IngestError, Result};
use crate::traits::{Classifier, Embedder, Fetcher};
use crate::types::{FetchOutcome, PageFailure, RawPage, TargetConfig};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// A fetcher that returns scripted pages.
#[derive(Default)]
pub struct MockFetcher {
    pages: Vec<RawPage>,
    failures: Vec<PageFailure>,
    reject_login: bool,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: RawPage) -> Self {
        self.pages.push(page);
        self
    }

    pub fn with_failure(mut self, failure: PageFailure) -> Self {
        self.failures.push(failure);
        self
    }

    /// Fail every fetch as if the site refused the login.
    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Names of the targets fetched so far.
    pub fn calls(&self) -> Vec<String> {
        read(&self.calls).clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch_target(&self, target: &TargetConfig) -> Result<FetchOutcome> {
        write(&self.calls).push(target.name.clone());

        if self.reject_login {
            return Err(AuthError::LoginRejected {
                url: target.start_urls.first().cloned().unwrap_or_default(),
                attempts: 2,
            }
            .into());
        }

        Ok(FetchOutcome {
            pages: self.pages.clone(),
            failures: self.failures.clone(),
        })
    }
}

/// A classifier with scripted answers.
///
/// Rules match when the item text contains the given substring; the first
/// matching rule wins. Unmatched text gets the default answer ("no").
pub struct MockClassifier {
    rules: Vec<(String, std::result::Result<String, String>)>,
    default: String,
    calls: Arc<RwLock<Vec<(String, String)>>>,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default: "no".to_string(),
            calls: Arc::default(),
        }
    }
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `response` for every unmatched text.
    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default = response.into();
        self
    }

    pub fn with_response_for(mut self, contains: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((contains.into(), Ok(response.into())));
        self
    }

    /// Fail the call for texts containing `contains`.
    pub fn with_failure_for(mut self, contains: impl Into<String>) -> Self {
        let contains = contains.into();
        let message = format!("scripted failure for '{}'", contains);
        self.rules.push((contains, Err(message)));
        self
    }

    /// (instruction, text) of every call, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        read(&self.calls).clone()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, instruction: &str, text: &str) -> Result<String> {
        write(&self.calls).push((instruction.to_string(), text.to_string()));

        match self.rules.iter().find(|(needle, _)| text.contains(needle.as_str())) {
            Some((_, Ok(response))) => Ok(response.clone()),
            Some((_, Err(message))) => Err(IngestError::ServiceUnavailable(message.clone())),
            None => Ok(self.default.clone()),
        }
    }
}

/// A deterministic embedder.
///
/// Each lowercased word is hashed into a bucket, so texts that share words
/// score high under cosine similarity. Exact-text overrides and failure
/// injection are available.
pub struct MockEmbedder {
    dimension: usize,
    overrides: HashMap<String, Vec<f32>>,
    fail_when_contains: Vec<String>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            overrides: HashMap::new(),
            fail_when_contains: Vec::new(),
            calls: Arc::default(),
        }
    }

    pub fn with_embedding(mut self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.overrides.insert(text.into(), embedding);
        self
    }

    pub fn with_failure_for(mut self, contains: impl Into<String>) -> Self {
        self.fail_when_contains.push(contains.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        read(&self.calls).clone()
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = Sha256::digest(word.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
            ]) as usize
                % self.dimension;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        write(&self.calls).push(text.to_string());

        if self.fail_when_contains.iter().any(|s| text.contains(s.as_str())) {
            return Err(IngestError::Embedding(format!("scripted failure for '{}'", text)));
        }
        if let Some(embedding) = self.overrides.get(text) {
            return Ok(embedding.clone());
        }
        Ok(self.hashed(text))
    }
}
