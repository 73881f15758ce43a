//! Pipeline stages and the run driver.

pub mod filter;
pub mod load;
pub mod persist;
pub mod query;
pub mod run;

pub use filter::{FilterResult, RelevanceFilter};
pub use load::{load_items, parse_items, write_items_jsonl};
pub use persist::{PersistConfig, PersistResult, Persister};
pub use query::{FetchRecords, QueryClient, QueryOptions};
pub use run::{scrape_target, Pipeline, ScrapeOutput, TargetRun};
