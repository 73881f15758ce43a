//! Raw fetched pages and per-target fetch results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw page content before extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPage {
    /// URL that was requested
    pub url: String,

    /// URL after redirects; relative links resolve against this
    pub final_url: String,

    /// HTTP status of the final response
    pub status: u16,

    pub html: String,

    /// Zero-based index within the pagination chain
    pub depth: u32,

    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    /// Create a page whose final URL equals the requested one.
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            html: html.into(),
            depth: 0,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn has_content(&self) -> bool {
        !self.html.trim().is_empty()
    }
}

/// A page that could not be fetched after all retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub url: String,
    pub message: String,
}

impl PageFailure {
    pub fn new(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// Everything a fetcher produced for one target.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub pages: Vec<RawPage>,
    pub failures: Vec<PageFailure>,
}

impl FetchOutcome {
    pub fn push_page(&mut self, page: RawPage) {
        self.pages.push(page);
    }

    pub fn push_failure(&mut self, failure: PageFailure) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.failures.is_empty()
    }
}
