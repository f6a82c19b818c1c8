use crate::traits::VectorIndex;
use crate::{Embedder, RagError, RetrievalHit};
use tracing::debug;

pub struct Retriever<V> {
    index: V,
    embedder: Embedder,
}

impl<V> Retriever<V>
where
    V: VectorIndex + Send + Sync,
{
    pub fn new(index: V, embedder: Embedder) -> Self {
        Self { index, embedder }
    }

    /// Up to `k` hits for `query`, highest score first. Equal scores keep the
    /// order the index returned them in.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidArgument("query is empty".to_string()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query).await?;
        let mut hits = self.index.similarity_search(&query_vector, k).await?;

        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(k);
        debug!(k, hits = hits.len(), "retrieved context");
        Ok(hits)
    }
}
