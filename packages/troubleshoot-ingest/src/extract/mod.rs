//! Turning fetched pages into screened items.

pub mod extractor;
pub mod rules;
pub mod screen;

pub use extractor::{Extraction, Extractor};
pub use rules::{CompiledRules, ExtractionRules, Field, FieldRule};
pub use screen::ItemScreen;
