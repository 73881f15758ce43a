//! Core data types.

pub mod item;
pub mod page;
pub mod record;
pub mod report;
pub mod target;

pub use item::ScrapedItem;
pub use page::{FetchOutcome, PageFailure, RawPage};
pub use record::{InsertOutcome, PersistedRecord, QueryHit, VectorEntry, VectorMatch, VectorMetadata};
pub use report::{DiscardReason, FailureKind, ItemOutcome, ItemReport, RunReport, Stage};
pub use target::{LoginConfig, PaginationRule, TargetConfig};
