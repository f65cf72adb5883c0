#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod eval;
pub mod generate;
pub mod ingest;
pub mod retrieve;

pub use eval::{answer_quality, evaluate, load_cases, EvalCase, EvalResult, EvalSummary};
pub use generate::{configured_generator, CommandGenerator};
pub use ingest::{IngestOptions, IngestReport, Ingestor};
pub use retrieve::{format_context, QueryOptions, Retriever, GENERATION_FAILED_ANSWER, NO_RESULTS_ANSWER};
