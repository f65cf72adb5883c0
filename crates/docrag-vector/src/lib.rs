//! Vector index over pluggable backends.
//!
//! `VectorIndex` validates requests and owns ranking; `VectorStore`
//! implementations (`MemoryStore`, `LanceStore`) only store and score.

pub mod filter;
pub mod index;
pub mod lance;
pub mod memory;
pub mod schema;
pub mod store;

pub use filter::{FieldFilter, Filter, IndexedField};
pub use index::{IndexStatus, VectorIndex};
pub use lance::LanceStore;
pub use memory::MemoryStore;
pub use store::{CollectionInfo, SearchRequest, VectorStore};
