//! Per-run admission checks shared by fetched and file-loaded items.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::types::{DiscardReason, ScrapedItem};

/// Drops empty items and repeats of an already-seen URL within one run.
///
/// Items without a URL are deduplicated by their content key instead.
#[derive(Debug, Default)]
pub struct ItemScreen {
    seen: HashSet<String>,
    discard_log: Option<PathBuf>,
}

impl ItemScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append discarded empty items, as JSON lines, to this file.
    pub fn with_discard_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.discard_log = Some(path.into());
        self
    }

    /// Clean the item and decide whether it continues down the pipeline.
    pub fn admit(&mut self, item: ScrapedItem) -> Result<ScrapedItem, (ScrapedItem, DiscardReason)> {
        let item = item.cleaned();

        if item.is_empty() {
            debug!(url = %item.url, "Discarding empty item");
            self.log_discard(&item);
            return Err((item, DiscardReason::Empty));
        }

        if !self.seen.insert(item.doc_key()) {
            debug!(url = %item.url, "Skipping duplicate URL");
            return Err((item, DiscardReason::Duplicate));
        }

        Ok(item)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn log_discard(&self, item: &ScrapedItem) {
        let Some(path) = &self.discard_log else {
            return;
        };
        let result = serde_json::to_string(item)
            .map_err(std::io::Error::from)
            .and_then(|line| {
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                writeln!(file, "{}", line)
            });
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write discard log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_duplicate() {
        let mut screen = ItemScreen::new();

        let kept = screen
            .admit(ScrapedItem::new("a").with_issue("Rack won't power on").with_solution("Check breaker"))
            .unwrap();
        assert_eq!(kept.issue, "Rack won't power on");

        let (_, reason) = screen.admit(ScrapedItem::new("a")).unwrap_err();
        assert_eq!(reason, DiscardReason::Empty);

        let (_, reason) = screen
            .admit(ScrapedItem::new(" a ").with_issue("Other issue"))
            .unwrap_err();
        assert_eq!(reason, DiscardReason::Duplicate);

        assert_eq!(screen.seen_count(), 1);
    }

    #[test]
    fn test_empty_item_does_not_claim_url() {
        let mut screen = ItemScreen::new();
        assert!(screen.admit(ScrapedItem::new("a").with_category("PDF")).is_err());
        assert!(screen.admit(ScrapedItem::new("a").with_product("EA-5")).is_ok());
    }

    #[test]
    fn test_urlless_items_dedup_by_content() {
        let mut screen = ItemScreen::new();
        assert!(screen.admit(ScrapedItem::default().with_issue("No audio")).is_ok());
        assert!(screen.admit(ScrapedItem::default().with_issue("No video")).is_ok());
        assert!(screen.admit(ScrapedItem::default().with_issue("No audio")).is_err());
    }

    #[test]
    fn test_discard_log_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discarded.jsonl");
        let mut screen = ItemScreen::new().with_discard_log(&path);

        let _ = screen.admit(ScrapedItem::new("https://x.com/1"));
        let _ = screen.admit(ScrapedItem::new("https://x.com/2").with_category("PDF"));

        let log = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("https://x.com/2"));
    }
}
