//! The scraped item: the unit of data moving through the pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum characters sent to the embedding service.
pub const EMBEDDING_INPUT_CAP: usize = 8_192;

/// One extracted unit of troubleshooting content.
///
/// Every string field defaults to empty, so partially-populated JSON loads
/// cleanly. `solution` is the primary payload and may be arbitrarily long.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedItem {
    pub url: String,
    pub product: String,
    pub category: String,
    pub issue: String,
    pub solution: String,
    /// Crawl depth at which the item was found (informational only).
    pub depth: u32,
}

impl ScrapedItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issue = issue.into();
        self
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = solution.into();
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Trim every string field.
    pub fn cleaned(self) -> Self {
        Self {
            url: self.url.trim().to_string(),
            product: self.product.trim().to_string(),
            category: self.category.trim().to_string(),
            issue: self.issue.trim().to_string(),
            solution: self.solution.trim().to_string(),
            depth: self.depth,
        }
    }

    /// An item is empty when `issue`, `solution` and `product` are all blank.
    /// `url` and `category` alone do not make an item worth keeping.
    pub fn is_empty(&self) -> bool {
        self.issue.trim().is_empty()
            && self.solution.trim().is_empty()
            && self.product.trim().is_empty()
    }

    /// Text for the embedding service: non-blank product, category, issue and
    /// solution joined by spaces, capped at [`EMBEDDING_INPUT_CAP`] chars.
    /// Empty when there is nothing meaningful to embed.
    pub fn embedding_text(&self) -> String {
        let joined = join_non_blank(
            [&self.product, &self.category, &self.issue, &self.solution],
            " ",
        );
        truncate_chars(&joined, EMBEDDING_INPUT_CAP).to_string()
    }

    /// Text for the relevance classifier: non-blank issue, solution, product
    /// and category joined by newlines, capped at `max_chars`.
    pub fn classification_text(&self, max_chars: usize) -> String {
        let joined = join_non_blank(
            [&self.issue, &self.solution, &self.product, &self.category],
            "\n",
        );
        truncate_chars(&joined, max_chars).to_string()
    }

    /// Deterministic key shared by the relational row and the vector entry.
    ///
    /// Derived from the URL when present, otherwise from the embedding text,
    /// so re-ingesting the same item always lands on the same identifiers.
    pub fn doc_key(&self) -> String {
        let url = self.url.trim();
        let mut hasher = Sha256::new();
        if url.is_empty() {
            hasher.update(b"content:");
            hasher.update(self.embedding_text().as_bytes());
        } else {
            hasher.update(b"url:");
            hasher.update(url.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

fn join_non_blank<'a>(parts: impl IntoIterator<Item = &'a String>, sep: &str) -> String {
    parts
        .into_iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Truncate to at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncate to at most `max_bytes` bytes, backing off to a char boundary.
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
