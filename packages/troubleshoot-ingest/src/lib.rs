//! Troubleshooting Document Ingest
//!
//! Scrapes vendor troubleshooting documents (Control4, Lutron, SnapOne) from
//! public and dealer-only portals, keeps the ones an LLM judges relevant, and
//! loads them into Postgres (full text) and a Pinecone index (embeddings),
//! then answers natural-language lookups against both.
//!
//! # Pipeline
//!
//! Strictly linear, each stage materializing its output before the next:
//!
//! ```text
//! Fetcher → Extractor → RelevanceFilter → Persister
//!                                          ├─ RecordStore (untruncated rows)
//!                                          └─ VectorIndex (embedding + clipped metadata)
//! QueryClient: Embedder → VectorIndex → RecordStore (when metadata was clipped)
//! ```
//!
//! Sites are described declaratively in TOML ([`TargetConfig`]): start URLs,
//! an optional form login, a pagination rule, and per-field extraction rules.
//! Every item ends a run with a typed [`ItemOutcome`] in the [`RunReport`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use troubleshoot_ingest::{HttpFetcher, Pipeline, TargetConfig};
//! use troubleshoot_ingest::stores::{MemoryRecordStore, MemoryVectorIndex};
//! use troubleshoot_ingest::testing::{MockClassifier, MockEmbedder};
//!
//! let target = TargetConfig::from_file("targets/control4-docs.toml")?;
//! let fetcher = HttpFetcher::for_target(&target)?;
//!
//! let classifier = MockClassifier::new().with_default("yes");
//! let embedder = MockEmbedder::new(1536);
//! let records = MemoryRecordStore::new();
//! let index = MemoryVectorIndex::new();
//!
//! let report = Pipeline::new(&classifier, &embedder, &records, &index)
//!     .run(&fetcher, &target)
//!     .await?;
//! println!("{}", report.summary());
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Service seams (Fetcher, Classifier, Embedder, RecordStore, VectorIndex)
//! - [`types`] - Items, records, pages, targets, run reports
//! - [`fetchers`] - HTTP fetcher with sessions, login, pagination, robots.txt
//! - [`extract`] - Declarative extraction rules and per-run screening
//! - [`pipeline`] - Filter, persist, query, file loading, run driver
//! - [`stores`] - Postgres, Pinecone, and in-memory stores
//! - [`ai`] - OpenAI classifier and embedder
//! - [`security`] - Secret and credential handling
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetchers;
pub mod pipeline;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

pub use config::Settings;
pub use error::{AuthError, ConfigError, FetchError, IngestError, Result};
pub use extract::{ExtractionRules, Extractor, FieldRule};
pub use fetchers::HttpFetcher;
pub use pipeline::{
    load_items, scrape_target, write_items_jsonl, FetchRecords, PersistConfig, Persister, Pipeline,
    QueryClient, QueryOptions, RelevanceFilter, TargetRun,
};
pub use traits::{Classifier, Embedder, Fetcher, RecordStore, VectorIndex};
pub use types::{
    DiscardReason, FailureKind, ItemOutcome, PersistedRecord, QueryHit, RawPage, RunReport,
    ScrapedItem, Stage, TargetConfig,
};
