//! Service seams. The pipeline is generic over these, so production clients
//! and in-memory mocks plug in the same way.

pub mod ai;
pub mod fetcher;
pub mod store;

pub use ai::{Classifier, Embedder};
pub use fetcher::Fetcher;
pub use store::{cosine_similarity, RecordStore, VectorIndex};
