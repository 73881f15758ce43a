//! LLM relevance filter.

use tracing::{debug, info, warn};

use crate::config::DEFAULT_TOPIC;
use crate::error::Result;
use crate::traits::Classifier;
use crate::types::{DiscardReason, FailureKind, ItemOutcome, ScrapedItem, Stage};

/// Default cap on classifier input, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;

/// Items sorted by the filter.
#[derive(Debug, Default)]
pub struct FilterResult {
    pub kept: Vec<ScrapedItem>,
    /// (url, outcome) for every item not kept
    pub dropped: Vec<(String, ItemOutcome)>,
}

/// Asks a classifier whether each item belongs to the topic domain.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    topic: String,
    max_input_chars: usize,
    enabled: bool,
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC)
    }
}

impl RelevanceFilter {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            enabled: true,
        }
    }

    /// A filter that keeps everything without calling the classifier.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn instruction(&self, brand: &str) -> String {
        format!(
            "You are a filter for {} troubleshooting data. Return 'yes' if relevant to {}; else 'no'.",
            brand, self.topic
        )
    }

    /// Only an exact (case-insensitive, trimmed) "yes" counts.
    pub fn is_affirmative(response: &str) -> bool {
        response.trim().eq_ignore_ascii_case("yes")
    }

    /// Classify one item.
    pub async fn is_relevant<C>(&self, classifier: &C, brand: &str, item: &ScrapedItem) -> Result<bool>
    where
        C: Classifier + ?Sized,
    {
        let text = item.classification_text(self.max_input_chars);
        let response = classifier.classify(&self.instruction(brand), &text).await?;
        Ok(Self::is_affirmative(&response))
    }

    /// Filter a list, one call per item. A failed call excludes that item and
    /// the rest continue.
    pub async fn filter<C>(&self, classifier: &C, brand: &str, items: Vec<ScrapedItem>) -> FilterResult
    where
        C: Classifier + ?Sized,
    {
        if !self.enabled {
            debug!(items = items.len(), "Relevance filter disabled");
            return FilterResult {
                kept: items,
                dropped: Vec::new(),
            };
        }

        let mut result = FilterResult::default();
        for item in items {
            match self.is_relevant(classifier, brand, &item).await {
                Ok(true) => result.kept.push(item),
                Ok(false) => {
                    debug!(url = %item.url, "Not relevant");
                    result
                        .dropped
                        .push((item.url, ItemOutcome::discarded(DiscardReason::NotRelevant)));
                }
                Err(e) => {
                    warn!(url = %item.url, error = %e, "Classification failed, excluding item");
                    let outcome = ItemOutcome::failed(Stage::Classify, FailureKind::of(&e), e.to_string());
                    result.dropped.push((item.url, outcome));
                }
            }
        }

        info!(
            brand,
            kept = result.kept.len(),
            dropped = result.dropped.len(),
            "Relevance filter complete"
        );
        result
    }
}
