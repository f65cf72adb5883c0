//! Read path: embed the query, search, assemble an attributed context.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use docrag_core::config::QuerySettings;
use docrag_core::error::Result;
use docrag_core::types::{keys, AnswerStyle, ContextBundle, SearchResult};
use docrag_core::{AnswerGenerator, Embedder};
use docrag_vector::{Filter, VectorIndex};

pub const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant information to answer your question.";
pub const GENERATION_FAILED_ANSWER: &str = "Error generating answer based on the retrieved context.";
const UNKNOWN_SOURCE: &str = "Unknown source";

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub filter: Filter,
    pub score_threshold: Option<f32>,
    pub style: AnswerStyle,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from_settings(&QuerySettings::default())
    }
}

impl QueryOptions {
    pub fn from_settings(settings: &QuerySettings) -> Self {
        Self {
            top_k: settings.top_k,
            filter: Filter::new(),
            score_threshold: settings.score_threshold,
            style: AnswerStyle::General,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self { self.top_k = top_k; self }
    pub fn with_filter(mut self, filter: Filter) -> Self { self.filter = filter; self }
    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self { self.score_threshold = threshold; self }
    pub fn with_style(mut self, style: AnswerStyle) -> Self { self.style = style; self }
}

pub struct Retriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    collection: String,
}

impl Retriever {
    pub fn new(index: VectorIndex, embedder: Arc<dyn Embedder>, collection: impl Into<String>) -> Self {
        Self { index, embedder, generator: None, collection: collection.into() }
    }

    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Only configuration errors escape; backend and embedding failures
    /// degrade to the empty bundle.
    pub fn retrieve(&self, query: &str, opts: &QueryOptions) -> Result<ContextBundle> {
        info!(query, top_k = opts.top_k, "processing query");
        let vector = match self.embedder.embed_one(query) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return Ok(empty_bundle(query));
            }
        };

        let hits = match self.index.search(&self.collection, &vector, &opts.filter, opts.top_k, opts.score_threshold) {
            Ok(hits) => hits,
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!(error = %e, collection = %self.collection, "search failed");
                return Ok(empty_bundle(query));
            }
        };

        let hits: Vec<SearchResult> = hits.into_iter().filter(|h| h.payload_str(keys::TEXT).is_some()).collect();
        if hits.is_empty() {
            warn!(query, "no relevant documents found");
            return Ok(empty_bundle(query));
        }

        let (context, sources) = format_context(&hits);
        let answer = self.generator.as_ref().map(|g| match g.generate(&context, query, opts.style) {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "answer generation failed");
                GENERATION_FAILED_ANSWER.to_string()
            }
        });
        Ok(ContextBundle { query: query.to_string(), sources, context, answer })
    }
}

fn empty_bundle(query: &str) -> ContextBundle {
    ContextBundle {
        query: query.to_string(),
        sources: Vec::new(),
        context: String::new(),
        answer: Some(NO_RESULTS_ANSWER.to_string()),
    }
}

/// One block per hit, in order:
/// `[Source: <file name>[ [<product>]], Score: <score:.2>]\n<text>\n\n`.
/// Returns the context and the per-hit source list (not deduplicated).
pub fn format_context(hits: &[SearchResult]) -> (String, Vec<String>) {
    let mut context = String::new();
    let mut sources = Vec::with_capacity(hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let source = hit.payload_str(keys::SOURCE).filter(|s| !s.is_empty());
        let label = match source {
            Some(s) => Path::new(s)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| s.to_string()),
            None => format!("Document {}", i + 1),
        };
        let product = match hit.payload_str(keys::PRODUCT).filter(|p| !p.is_empty()) {
            Some(p) => format!(" [{p}]"),
            None => String::new(),
        };
        let text = hit.payload_str(keys::TEXT).unwrap_or_default();
        context.push_str(&format!("[Source: {label}{product}, Score: {:.2}]\n{text}\n\n", hit.score));
        sources.push(source.unwrap_or(UNKNOWN_SOURCE).to_string());
    }
    (context, sources)
}
