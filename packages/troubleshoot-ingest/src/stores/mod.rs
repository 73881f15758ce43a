//! Record store and vector index implementations.

pub mod memory;
pub mod pinecone;
pub mod postgres;

pub use memory::{MemoryRecordStore, MemoryVectorIndex};
pub use pinecone::{ensure_index, IndexSpec, PineconeVectorIndex};
pub use postgres::PostgresRecordStore;
