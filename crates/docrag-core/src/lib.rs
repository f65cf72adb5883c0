#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod metadata;
pub mod traits;
pub mod types;

pub use chunker::Chunker;
pub use config::Settings;
pub use error::{Error, Result};
pub use metadata::MetadataExtractor;
pub use traits::{AnswerGenerator, Embedder};
pub use types::{keys, AnswerStyle, Chunk, ContextBundle, Document, IndexedPoint, Metadata, PointId, SearchResult};
