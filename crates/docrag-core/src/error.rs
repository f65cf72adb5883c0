use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad dimension, unknown filter field, invalid settings. Never retried.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A write batch failed; batches before `batch` remain committed.
    #[error("Ingestion failed at batch {batch}: {message}")]
    Ingestion { batch: usize, message: String },

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Vector store operation failed: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
