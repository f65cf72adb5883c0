//! Offline evaluation: run a list of queries with known answers and score
//! retrieval success and answer token overlap.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use docrag_core::error::Result;

use crate::retrieve::{QueryOptions, Retriever};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    pub expected_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub query: String,
    pub expected_answer: String,
    pub actual_answer: String,
    pub sources: Vec<String>,
    pub retrieval_score: f64,
    /// `None` when no generator produced the answer.
    pub answer_quality: Option<f64>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub avg_retrieval_score: f64,
    pub avg_answer_quality: Option<f64>,
    pub avg_elapsed_secs: f64,
    pub num_queries: usize,
    pub results: Vec<EvalResult>,
}

pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

/// Share of the expected answer's distinct lowercase tokens found in `actual`.
pub fn answer_quality(expected: &str, actual: &str) -> f64 {
    let expected_lower = expected.to_lowercase();
    let actual_lower = actual.to_lowercase();
    let expected_tokens: HashSet<&str> = expected_lower.split_whitespace().collect();
    let actual_tokens: HashSet<&str> = actual_lower.split_whitespace().collect();
    if expected_tokens.is_empty() || actual_tokens.is_empty() {
        return 0.0;
    }
    expected_tokens.intersection(&actual_tokens).count() as f64 / expected_tokens.len() as f64
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Answer quality is only scored when the retriever has a generator;
/// otherwise the only answers are canned ones.
pub fn evaluate(retriever: &Retriever, cases: &[EvalCase], opts: &QueryOptions) -> Result<EvalSummary> {
    let scored = retriever.has_generator();
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let start = Instant::now();
        let bundle = retriever.retrieve(&case.query, opts)?;
        let elapsed_secs = start.elapsed().as_secs_f64();

        let actual_answer = bundle.answer.unwrap_or_default();
        let result = EvalResult {
            retrieval_score: if bundle.sources.is_empty() { 0.0 } else { 1.0 },
            answer_quality: scored.then(|| answer_quality(&case.expected_answer, &actual_answer)),
            query: case.query.clone(),
            expected_answer: case.expected_answer.clone(),
            actual_answer,
            sources: bundle.sources,
            elapsed_secs,
        };
        info!(
            query = %result.query,
            retrieval = result.retrieval_score,
            quality = ?result.answer_quality,
            secs = result.elapsed_secs,
            "evaluated query"
        );
        results.push(result);
    }

    let summary = EvalSummary {
        avg_retrieval_score: mean(results.iter().map(|r| r.retrieval_score)),
        avg_answer_quality: scored.then(|| mean(results.iter().filter_map(|r| r.answer_quality))),
        avg_elapsed_secs: mean(results.iter().map(|r| r.elapsed_secs)),
        num_queries: results.len(),
        results,
    };
    Ok(summary)
}
