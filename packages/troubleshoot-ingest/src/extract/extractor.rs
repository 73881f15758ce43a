//! Page-to-item extraction for one run.

use std::path::PathBuf;

use tracing::debug;

use super::rules::{CompiledRules, ExtractionRules};
use super::screen::ItemScreen;
use crate::error::ConfigResult;
use crate::types::{DiscardReason, RawPage, ScrapedItem};

/// What extraction produced for a batch of pages.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Items that passed the empty and duplicate checks, in page order.
    pub items: Vec<ScrapedItem>,
    /// (url, reason) for every item dropped here.
    pub discarded: Vec<(String, DiscardReason)>,
    /// Total items the rules matched before screening.
    pub matched: usize,
}

/// Applies compiled rules to pages and screens the results.
pub struct Extractor {
    rules: Option<CompiledRules>,
    screen: ItemScreen,
}

impl Extractor {
    pub fn new(rules: &ExtractionRules) -> ConfigResult<Self> {
        Ok(Self {
            rules: Some(rules.compile()?),
            screen: ItemScreen::new(),
        })
    }

    /// An extractor with no page rules, for items that arrive already
    /// structured.
    pub fn screen_only() -> Self {
        Self {
            rules: None,
            screen: ItemScreen::new(),
        }
    }

    pub fn with_discard_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.screen = self.screen.with_discard_log(path);
        self
    }

    /// Extract from one page, appending to `out`.
    pub fn extract_page(&mut self, page: &RawPage, out: &mut Extraction) {
        let Some(rules) = &self.rules else {
            return;
        };
        let items = rules.extract(page);
        debug!(url = %page.final_url, items = items.len(), "Extracted page");
        out.matched += items.len();

        for item in items {
            match self.screen.admit(item) {
                Ok(item) => out.items.push(item),
                Err((item, reason)) => out.discarded.push((item.url, reason)),
            }
        }
    }

    pub fn extract_all(&mut self, pages: &[RawPage]) -> Extraction {
        let mut out = Extraction::default();
        for page in pages {
            self.extract_page(page, &mut out);
        }
        out
    }

    /// Screen items that did not come from a page (e.g. loaded from a file).
    pub fn screen_items(&mut self, items: impl IntoIterator<Item = ScrapedItem>) -> Extraction {
        let mut out = Extraction::default();
        for item in items {
            out.matched += 1;
            match self.screen.admit(item) {
                Ok(item) => out.items.push(item),
                Err((item, reason)) => out.discarded.push((item.url, reason)),
            }
        }
        out
    }
}
