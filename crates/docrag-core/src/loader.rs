//! Directory loader: plain text and markdown files, plus JSON FAQ files.
//!
//! A file that cannot be read or parsed is logged and skipped; it never
//! aborts the run.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{keys, Document, Metadata, QA_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Text,
    QaJson,
}

fn kind_of(path: &Path) -> Option<FileKind> {
    match path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("txt") | Some("md") => Some(FileKind::Text),
        Some("json") => Some(FileKind::QaJson),
        _ => None,
    }
}

/// Supported files under `root`, sorted for a stable ingestion order.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| kind_of(p).is_some())
        .collect();
    files.sort();
    files
}

/// Load every supported file under `root`.
pub fn load_directory(root: &Path) -> Vec<Document> {
    let files = list_files(root);
    if files.is_empty() {
        warn!(dir = %root.display(), "no supported files found");
        return Vec::new();
    }
    let mut docs = Vec::new();
    for (i, path) in files.iter().enumerate() {
        debug!(file = %path.display(), n = i + 1, of = files.len(), "loading");
        match load_file(path) {
            Ok(mut loaded) => docs.append(&mut loaded),
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    info!(files = files.len(), documents = docs.len(), "loaded documents");
    docs
}

/// Load one file. Unsupported extensions yield no documents.
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    match kind_of(path) {
        Some(FileKind::Text) => Ok(vec![load_text(path)?]),
        Some(FileKind::QaJson) => load_qa_json(path),
        None => {
            debug!(file = %path.display(), "unsupported extension");
            Ok(Vec::new())
        }
    }
}

fn load_text(path: &Path) -> Result<Document> {
    let text = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => String::from_utf8_lossy(&fs::read(path)?).to_string(),
    };
    let mut meta = Metadata::new();
    meta.insert(keys::SOURCE.into(), Value::from(path.to_string_lossy().to_string()));
    Ok(Document::with_metadata(text, meta))
}

/// Accepted shapes:
/// - `[{question, answer | response, metadata?}, ...]`
/// - `{"faq": [{question, answer}, ...]}`
/// - `{"cyanview_faq": {"<category>": [{question, answer}, ...], ...}}`
pub fn load_qa_json(path: &Path) -> Result<Vec<Document>> {
    let data: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(parse_qa_value(&data, &path.to_string_lossy()))
}

pub fn parse_qa_value(data: &Value, source: &str) -> Vec<Document> {
    let mut docs = Vec::new();
    match data {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let (Some(question), Some(answer)) = (item.get("question"), item.get("answer").or_else(|| item.get("response"))) else {
                    continue;
                };
                let mut meta = qa_metadata(source, i);
                if let Some(Value::Object(extra)) = item.get("metadata") {
                    for (k, v) in extra {
                        meta.insert(k.clone(), v.clone());
                    }
                }
                docs.push(Document::with_metadata(qa_text(question, answer), meta));
            }
        }
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("faq") {
                for (i, item) in items.iter().enumerate() {
                    docs.push(qa_document(item, qa_metadata(source, i)));
                }
            } else if let Some(Value::Object(categories)) = map.get("cyanview_faq") {
                for (category, items) in categories {
                    let Value::Array(items) = items else { continue };
                    for (i, item) in items.iter().enumerate() {
                        let mut meta = qa_metadata(source, i);
                        meta.insert(keys::CATEGORY.into(), Value::from(category.clone()));
                        docs.push(qa_document(item, meta));
                    }
                }
            } else {
                debug!(source, "json object without faq entries");
            }
        }
        _ => debug!(source, "json document is neither a list nor an object"),
    }
    docs
}

fn qa_document(item: &Value, meta: Metadata) -> Document {
    let question = item.get("question").unwrap_or(&Value::Null);
    let answer = item.get("answer").unwrap_or(&Value::Null);
    Document::with_metadata(qa_text(question, answer), meta)
}

fn qa_metadata(source: &str, index: usize) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert(keys::SOURCE.into(), Value::from(source));
    meta.insert(keys::TYPE.into(), Value::from(QA_TYPE));
    meta.insert(keys::INDEX.into(), Value::from(index));
    meta
}

fn qa_text(question: &Value, answer: &Value) -> String {
    format!("Q: {}\nA: {}", plain(question), plain(answer))
}

fn plain(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
