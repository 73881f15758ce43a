//! Typed per-item outcomes aggregated into a run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::page::PageFailure;

/// Why an item was dropped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Issue, solution and product all blank
    Empty,
    /// URL already seen in this run
    Duplicate,
    /// Classifier did not answer "yes"
    NotRelevant,
    /// Embedding text was blank; nothing was written
    NothingToEmbed,
}

/// Pipeline stage where an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classify,
    Insert,
    Embed,
    Upsert,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Classify => "classify",
            Stage::Insert => "insert",
            Stage::Embed => "embed",
            Stage::Upsert => "upsert",
        };
        f.write_str(s)
    }
}

/// Coarse failure category for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network trouble or a retryable service status
    Transient,
    /// The service rejected the request
    Rejected,
    /// Unexpected response body
    Malformed,
    /// Store or index error
    Storage,
}

impl FailureKind {
    /// Classify an [`IngestError`](crate::error::IngestError) raised by a stage.
    pub fn of(err: &crate::error::IngestError) -> Self {
        use crate::error::IngestError;
        match err {
            IngestError::Storage(_) | IngestError::VectorIndex(_) => FailureKind::Storage,
            IngestError::Json(_) => FailureKind::Malformed,
            IngestError::Fetch(_) | IngestError::Io(_) | IngestError::ServiceUnavailable(_) => {
                FailureKind::Transient
            }
            _ => FailureKind::Rejected,
        }
    }
}

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Persisted {
        record_id: i64,
        vector_id: String,
    },
    Discarded {
        reason: DiscardReason,
    },
    Failed {
        stage: Stage,
        kind: FailureKind,
        message: String,
    },
}

impl ItemOutcome {
    pub fn discarded(reason: DiscardReason) -> Self {
        ItemOutcome::Discarded { reason }
    }

    pub fn failed(stage: Stage, kind: FailureKind, message: impl Into<String>) -> Self {
        ItemOutcome::Failed {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, ItemOutcome::Persisted { .. })
    }
}

/// Outcome for one item, keyed by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    pub url: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub target: String,
    pub pages_fetched: usize,
    pub page_failures: Vec<PageFailure>,
    pub items_extracted: usize,
    pub items: Vec<ItemReport>,
    pub vectors_upserted: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            pages_fetched: 0,
            page_failures: Vec::new(),
            items_extracted: 0,
            items: Vec::new(),
            vectors_upserted: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record(&mut self, url: impl Into<String>, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            url: url.into(),
            outcome,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn persisted(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_persisted()).count()
    }

    pub fn discarded(&self, reason: DiscardReason) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == ItemOutcome::Discarded { reason })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed { .. }))
            .count()
    }

    pub fn failed_at(&self, stage: Stage) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(&i.outcome, ItemOutcome::Failed { stage: s, .. } if *s == stage))
            .count()
    }

    /// Outcome recorded for a URL (the last one, if recorded more than once).
    pub fn outcome_for(&self, url: &str) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .rev()
            .find(|i| i.url == url)
            .map(|i| &i.outcome)
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} pages ({} failed), {} items, {} persisted, {} vectors, {} empty, {} duplicate, {} not relevant, {} failed",
            self.target,
            self.pages_fetched,
            self.page_failures.len(),
            self.items_extracted,
            self.persisted(),
            self.vectors_upserted,
            self.discarded(DiscardReason::Empty),
            self.discarded(DiscardReason::Duplicate),
            self.discarded(DiscardReason::NotRelevant),
            self.failed(),
        )
    }
}
