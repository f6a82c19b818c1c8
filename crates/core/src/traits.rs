use crate::{GenerationError, IndexedRecord, RetrievalHit, SearchError};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex {
    /// Creates the index with a vector field of `dimensions` unless it already exists.
    async fn ensure_index(&self, dimensions: usize) -> Result<(), SearchError>;

    async fn bulk_write(&self, records: &[IndexedRecord]) -> Result<(), SearchError>;

    async fn refresh(&self) -> Result<(), SearchError>;

    /// Up to `top_k` hits ordered by descending similarity to `query_vector`.
    async fn similarity_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, SearchError>;
}

#[async_trait]
pub trait TextGenerator {
    /// Single non-streaming completion of `prompt` by `model`.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError>;
}
