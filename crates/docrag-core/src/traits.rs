use crate::types::AnswerStyle;

/// Embedding collaborator. Must be deterministic for a given model, and every
/// vector it returns must have length `dim()`.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Answer-generation collaborator. Failures are absorbed by the retriever.
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, context: &str, query: &str, style: AnswerStyle) -> anyhow::Result<String>;
}
