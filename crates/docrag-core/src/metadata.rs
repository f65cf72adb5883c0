//! Content-derived metadata: product and topic mentions, Q&A detection.

use regex::Regex;
use serde_json::Value;

use crate::config::Vocabulary;
use crate::error::{Error, Result};
use crate::types::{keys, Metadata, QA_TYPE};

struct Term {
    name: String,
    pattern: Regex,
}

impl Term {
    fn new(name: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(name)))
            .map_err(|e| Error::config(format!("invalid vocabulary term {name:?}: {e}")))?;
        Ok(Self { name: name.to_string(), pattern })
    }
}

/// Scans raw text for known product/topic names and Q&A structure.
/// Patterns are compiled once; `extract` is pure.
pub struct MetadataExtractor {
    products: Vec<Term>,
    topics: Vec<Term>,
    qa_markers: Regex,
    question_then_answer: Regex,
}

impl MetadataExtractor {
    pub fn new(vocabulary: &Vocabulary) -> Result<Self> {
        let compile = |names: &[String]| names.iter().map(|n| Term::new(n)).collect::<Result<Vec<_>>>();
        Ok(Self {
            products: compile(&vocabulary.products)?,
            topics: compile(&vocabulary.topics)?,
            qa_markers: Regex::new(r"(?s)Q:.*?A:").map_err(|e| Error::config(e.to_string()))?,
            question_then_answer: Regex::new(r"\?\s+[A-Z]").map_err(|e| Error::config(e.to_string()))?,
        })
    }

    pub fn extract(&self, content: &str) -> Metadata {
        let mut meta = Metadata::new();

        let products = ranked_mentions(&self.products, content);
        if let Some(first) = products.first() {
            meta.insert(keys::PRODUCT.into(), Value::from(first.clone()));
            meta.insert(keys::ALL_PRODUCTS.into(), Value::from(products));
        }

        let topics = ranked_mentions(&self.topics, content);
        if let Some(first) = topics.first() {
            meta.insert(keys::TOPIC.into(), Value::from(first.clone()));
            meta.insert(keys::ALL_TOPICS.into(), Value::from(topics));
        }

        if self.is_qa(content) {
            meta.insert(keys::TYPE.into(), Value::from(QA_TYPE));
        }
        meta
    }

    pub fn is_qa(&self, content: &str) -> bool {
        self.qa_markers.is_match(content) || self.question_then_answer.is_match(content)
    }
}

/// Terms with at least one whole-word hit, most frequent first.
/// The sort is stable so equal counts keep vocabulary order.
fn ranked_mentions(terms: &[Term], content: &str) -> Vec<String> {
    let mut found: Vec<(&str, usize)> = terms
        .iter()
        .map(|t| (t.name.as_str(), t.pattern.find_iter(content).count()))
        .filter(|(_, count)| *count > 0)
        .collect();
    found.sort_by(|a, b| b.1.cmp(&a.1));
    found.into_iter().map(|(name, _)| name.to_string()).collect()
}
