//! Domain types shared by the chunker, the vector index and the retriever.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Range;

/// Open-ended metadata. Ordered so payloads serialize deterministically.
pub type Metadata = BTreeMap<String, Value>;

pub type PointId = u64;

/// Well-known metadata keys.
pub mod keys {
    pub const SOURCE: &str = "source";
    pub const TYPE: &str = "type";
    pub const PRODUCT: &str = "product";
    pub const ALL_PRODUCTS: &str = "all_products";
    pub const TOPIC: &str = "topic";
    pub const ALL_TOPICS: &str = "all_topics";
    pub const CATEGORY: &str = "category";
    pub const INDEX: &str = "index";
    pub const CHUNK: &str = "chunk";
    pub const CHUNK_TOTAL: &str = "chunk_total";
    pub const TEXT: &str = "text";
}

/// Value of `type` for question/answer content.
pub const QA_TYPE: &str = "qa";

/// A loaded document: raw text plus whatever metadata the loader knew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), metadata: Metadata::new() }
    }

    pub fn with_metadata(text: impl Into<String>, metadata: Metadata) -> Self {
        Self { text: text.into(), metadata }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(keys::SOURCE).and_then(Value::as_str)
    }

    pub fn is_qa(&self) -> bool {
        self.metadata.get(keys::TYPE).and_then(Value::as_str) == Some(QA_TYPE)
    }

    /// Insert each derived key only where the document has no value yet.
    /// Metadata set by a loader always wins over content-derived metadata.
    pub fn merge_derived(&mut self, derived: Metadata) {
        for (key, value) in derived {
            self.metadata.entry(key).or_insert(value);
        }
    }
}

/// A contiguous segment of one document.
///
/// - `text`: chunk text (may carry an appended answer excerpt for Q&A repair)
/// - `span`: byte range of the segment in the parent text
/// - `chunk_index`/`chunk_total`: position among siblings
/// - `metadata`: inherited from the parent document
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub span: Range<usize>,
    pub chunk_index: usize,
    pub chunk_total: usize,
    pub metadata: Metadata,
}

impl Chunk {
    /// Payload persisted next to the vector: metadata plus chunk position and text.
    /// `fallback_source` is used when the parent had no `source`.
    pub fn to_payload(&self, fallback_source: &str) -> Metadata {
        let mut payload = self.metadata.clone();
        payload.insert(keys::TEXT.into(), Value::from(self.text.clone()));
        payload
            .entry(keys::SOURCE.to_string())
            .or_insert_with(|| Value::from(fallback_source));
        payload.insert(keys::CHUNK.into(), Value::from(self.chunk_index));
        payload.insert(keys::CHUNK_TOTAL.into(), Value::from(self.chunk_total));
        payload
    }
}

/// One vector plus payload, as stored in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPoint {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: Metadata,
}

/// A scored hit. Higher `score` is more relevant (cosine similarity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: PointId,
    pub score: f32,
    pub payload: Metadata,
}

impl SearchResult {
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Output of a query: the assembled context and its attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub query: String,
    pub sources: Vec<String>,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// Which flavor of answer the generator should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    #[default]
    General,
    Technical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_derived_keeps_explicit_values() {
        let mut meta = Metadata::new();
        meta.insert(keys::PRODUCT.into(), Value::from("RCP"));
        let mut doc = Document::with_metadata("text", meta);

        let mut derived = Metadata::new();
        derived.insert(keys::PRODUCT.into(), Value::from("RIO"));
        derived.insert(keys::TOPIC.into(), Value::from("Tally"));
        doc.merge_derived(derived);

        assert_eq!(doc.metadata[keys::PRODUCT], Value::from("RCP"));
        assert_eq!(doc.metadata[keys::TOPIC], Value::from("Tally"));
    }

    #[test]
    fn payload_carries_position_text_and_source() {
        let chunk = Chunk {
            text: "hello".into(),
            span: 0..5,
            chunk_index: 1,
            chunk_total: 3,
            metadata: Metadata::new(),
        };
        let payload = chunk.to_payload("chunk_7");
        assert_eq!(payload[keys::TEXT], Value::from("hello"));
        assert_eq!(payload[keys::SOURCE], Value::from("chunk_7"));
        assert_eq!(payload[keys::CHUNK], Value::from(1));
        assert_eq!(payload[keys::CHUNK_TOTAL], Value::from(3));
    }
}
