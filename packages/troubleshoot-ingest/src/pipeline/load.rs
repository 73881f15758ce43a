//! Reading and writing scraped items as JSON files.
//!
//! Accepts a JSON array, a single JSON object, or JSON lines. Malformed
//! entries are logged and skipped.

use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::ScrapedItem;

/// Load items from a file. Fields are trimmed; missing fields default to empty.
pub fn load_items(path: impl AsRef<Path>) -> Result<Vec<ScrapedItem>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let items = parse_items(&raw);
    info!(path = %path.display(), items = items.len(), "Loaded items");
    Ok(items)
}

pub fn parse_items(raw: &str) -> Vec<ScrapedItem> {
    let trimmed = raw.trim_start();

    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<Value>>(trimmed) {
            Ok(values) => {
                return values
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, v)| decode(v, i))
                    .collect()
            }
            Err(e) => warn!(error = %e, "Not a valid JSON array, reading as JSON lines"),
        }
    } else if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return decode(value, 0).into_iter().collect();
        }
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match serde_json::from_str::<Value>(line) {
            Ok(value) => decode(value, i),
            Err(e) => {
                warn!(line = i + 1, error = %e, "Skipping malformed line");
                None
            }
        })
        .collect()
}

fn decode(value: Value, position: usize) -> Option<ScrapedItem> {
    if !value.is_object() {
        warn!(position, "Skipping non-object entry");
        return None;
    }
    match serde_json::from_value::<ScrapedItem>(value) {
        Ok(item) => Some(item.cleaned()),
        Err(e) => {
            warn!(position, error = %e, "Skipping malformed entry");
            None
        }
    }
}

/// Write items as JSON lines, replacing the file.
pub fn write_items_jsonl(path: impl AsRef<Path>, items: &[ScrapedItem]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut file, item)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    info!(path = %path.display(), items = items.len(), "Wrote items");
    Ok(())
}
