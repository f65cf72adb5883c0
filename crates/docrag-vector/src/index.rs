//! Backend-independent vector index: validation, batching, ranking.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use docrag_core::error::{Error, Result};
use docrag_core::types::{IndexedPoint, SearchResult};

use crate::filter::Filter;
use crate::memory::MemoryStore;
use crate::store::{CollectionInfo, SearchRequest, VectorStore};

/// Readiness report. Never an error: an unreachable backend is reported as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub backend: String,
    pub reachable: bool,
    pub collections: Vec<CollectionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared handle over one backend. Cheap to clone.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    pub fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        self.store.collection_info(name)
    }

    /// Returns `true` when a collection was (re)built, `false` when an
    /// existing one was kept.
    pub fn create_collection(&self, name: &str, dimension: usize, recreate: bool) -> Result<bool> {
        if dimension == 0 {
            return Err(Error::config("collection dimension must be > 0"));
        }
        if let Some(existing) = self.store.collection_info(name)? {
            if !recreate {
                if existing.dimension != dimension {
                    warn!(collection = %name, existing = existing.dimension, requested = dimension,
                        "collection exists with a different dimension; keeping it");
                } else {
                    info!(collection = %name, points = existing.points, "collection exists; keeping it");
                }
                return Ok(false);
            }
            info!(collection = %name, "dropping collection for recreate");
            self.store.drop_collection(name)?;
        }
        self.store.create_collection(name, dimension)?;
        info!(collection = %name, dimension, backend = self.backend(), "created collection");
        Ok(true)
    }

    /// Write `points` in batches of `batch_size`, in order. On failure the
    /// error names the batch; earlier batches stay written.
    pub fn upsert(&self, name: &str, points: &[IndexedPoint], batch_size: usize) -> Result<usize> {
        if batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }
        let info = self
            .store
            .collection_info(name)?
            .ok_or_else(|| Error::config(format!("collection {name} does not exist")))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != info.dimension) {
            return Err(Error::config(format!(
                "point {} has dimension {}, collection {name} expects {}",
                bad.id,
                bad.vector.len(),
                info.dimension
            )));
        }
        if points.is_empty() {
            debug!(collection = %name, "nothing to upsert");
            return Ok(0);
        }

        let pb = ProgressBar::new(points.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} points ({percent}%) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut written = 0usize;
        for (batch, chunk) in points.chunks(batch_size).enumerate() {
            if let Err(e) = self.store.upsert(name, chunk) {
                pb.abandon_with_message(format!("batch {batch} failed"));
                warn!(collection = %name, batch, error = %e, "upsert batch failed");
                return Err(Error::Ingestion { batch, message: e.to_string() });
            }
            written += chunk.len();
            pb.set_position(written as u64);
        }
        pb.finish_with_message("done");
        info!(collection = %name, count = written, batches = points.len().div_ceil(batch_size), "upserted points");
        Ok(written)
    }

    /// Nearest neighbours by cosine similarity: at most `top_k` results,
    /// each scoring at least `score_threshold`, best first, ties by id.
    pub fn search(
        &self,
        name: &str,
        vector: &[f32],
        filter: &Filter,
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(Error::config("top_k must be > 0"));
        }
        let info = self
            .store
            .collection_info(name)
            .map_err(|e| Error::Retrieval(e.to_string()))?
            .ok_or_else(|| Error::Retrieval(format!("collection {name} does not exist")))?;
        if let Some(cond) = filter.conditions().iter().find(|c| !info.indexed_fields.contains(&c.field)) {
            return Err(Error::config(format!("collection {name} has no index on {}", cond.field)));
        }
        if vector.len() != info.dimension {
            return Err(Error::config(format!(
                "query has dimension {}, collection {name} expects {}",
                vector.len(),
                info.dimension
            )));
        }

        let request = SearchRequest { vector, filter, limit: top_k, score_threshold };
        let mut hits = self.store.search(name, &request).map_err(|e| match e {
            Error::Configuration(_) | Error::Retrieval(_) => e,
            other => Error::Retrieval(other.to_string()),
        })?;
        if let Some(min) = score_threshold {
            hits.retain(|h| h.score >= min);
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(top_k);
        debug!(collection = %name, hits = hits.len(), top_k, "search done");
        Ok(hits)
    }

    pub fn status(&self) -> IndexStatus {
        let backend = self.backend().to_string();
        let listed = self.store.ping().and_then(|_| self.store.list_collections());
        let names = match listed {
            Ok(names) => names,
            Err(e) => {
                return IndexStatus { backend, reachable: false, collections: Vec::new(), error: Some(e.to_string()) }
            }
        };
        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            match self.store.collection_info(&name) {
                Ok(Some(info)) => collections.push(info),
                Ok(None) => {}
                Err(e) => warn!(collection = %name, error = %e, "cannot describe collection"),
            }
        }
        IndexStatus { backend, reachable: true, collections, error: None }
    }
}
