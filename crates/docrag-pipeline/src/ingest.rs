//! Write path: load, enrich, split, embed, index.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use docrag_core::chunker::Chunker;
use docrag_core::config::Settings;
use docrag_core::error::{Error, Result};
use docrag_core::loader;
use docrag_core::types::{Document, IndexedPoint};
use docrag_core::{Embedder, MetadataExtractor};
use docrag_vector::VectorIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub embed_batch_size: usize,
    pub recreate: bool,
}

impl IngestOptions {
    pub fn from_settings(settings: &Settings, recreate: bool) -> Self {
        Self {
            chunk_size: settings.chunking.chunk_size,
            chunk_overlap: settings.chunking.chunk_overlap,
            batch_size: settings.ingest.batch_size,
            embed_batch_size: settings.ingest.embed_batch_size,
            recreate,
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub points: usize,
    pub elapsed: Duration,
}

pub struct Ingestor {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    extractor: MetadataExtractor,
    chunker: Chunker,
    collection: String,
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        extractor: MetadataExtractor,
        collection: impl Into<String>,
        options: IngestOptions,
    ) -> Result<Self> {
        if options.batch_size == 0 || options.embed_batch_size == 0 {
            return Err(Error::config("ingest batch sizes must be > 0"));
        }
        let chunker = Chunker::new(options.chunk_size, options.chunk_overlap)?;
        Ok(Self { index, embedder, extractor, chunker, collection: collection.into(), options })
    }

    pub fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        info!(dir = %dir.display(), "loading documents");
        let docs = loader::load_directory(dir);
        self.ingest_documents(docs)
    }

    pub fn ingest_documents(&self, mut docs: Vec<Document>) -> Result<IngestReport> {
        let start = Instant::now();
        for doc in &mut docs {
            let derived = self.extractor.extract(&doc.text);
            doc.merge_derived(derived);
        }

        let chunks = self.chunker.split_documents(&docs);
        info!(
            documents = docs.len(),
            chunks = chunks.len(),
            chunk_size = self.options.chunk_size,
            chunk_overlap = self.options.chunk_overlap,
            "split documents"
        );

        let dim = self.embedder.dim();
        self.index.create_collection(&self.collection, dim, self.options.recreate)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_all(&texts, dim)?;

        let points: Vec<IndexedPoint> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, vector))| IndexedPoint {
                id: i as u64,
                vector,
                payload: chunk.to_payload(&format!("chunk_{i}")),
            })
            .collect();

        let written = self.index.upsert(&self.collection, &points, self.options.batch_size)?;
        let report = IngestReport {
            documents: docs.len(),
            chunks: chunks.len(),
            points: written,
            elapsed: start.elapsed(),
        };
        info!(
            collection = %self.collection,
            documents = report.documents,
            points = report.points,
            secs = report.elapsed.as_secs_f64(),
            "ingestion completed"
        );
        Ok(report)
    }

    /// Embed in input order, `embed_batch_size` texts at a time.
    fn embed_all(&self, texts: &[String], dim: usize) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for (batch, slice) in texts.chunks(self.options.embed_batch_size).enumerate() {
            let vectors = self.embedder.embed_batch(slice).map_err(|e| {
                warn!(batch, error = %e, "embedding failed");
                Error::Ingestion { batch, message: format!("embedding failed: {e}") }
            })?;
            if vectors.len() != slice.len() {
                return Err(Error::Ingestion {
                    batch,
                    message: format!("embedder returned {} vectors for {} texts", vectors.len(), slice.len()),
                });
            }
            if let Some(v) = vectors.iter().find(|v| v.len() != dim) {
                return Err(Error::config(format!(
                    "embedder produced a {}-dim vector but reports dim {dim}",
                    v.len()
                )));
            }
            out.extend(vectors);
        }
        Ok(out)
    }
}
