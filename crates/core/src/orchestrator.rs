use crate::generation::clean_completion;
use crate::prompt::{build_prompt, ContextStyle};
use crate::retriever::Retriever;
use crate::traits::{TextGenerator, VectorIndex};
use crate::RagError;
use tracing::{debug, info};

pub const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant documents in the index.";

/// Answers questions from retrieved context: retrieve, build the prompt, generate.
///
/// Each call is one sequential round trip with no state kept between calls.
/// When retrieval finds nothing the generator is never contacted.
pub struct RagPipeline<V, G> {
    retriever: Retriever<V>,
    generator: G,
    style: ContextStyle,
}

impl<V, G> RagPipeline<V, G>
where
    V: VectorIndex + Send + Sync,
    G: TextGenerator + Send + Sync,
{
    pub fn new(retriever: Retriever<V>, generator: G) -> Self {
        Self {
            retriever,
            generator,
            style: ContextStyle::default(),
        }
    }

    pub fn with_context_style(mut self, style: ContextStyle) -> Self {
        self.style = style;
        self
    }

    pub async fn answer(&self, question: &str, k: usize, model: &str) -> Result<String, RagError> {
        let hits = self.retriever.retrieve(question, k).await?;
        if hits.is_empty() {
            info!("no context retrieved, skipping generation");
            return Ok(NO_RESULTS_ANSWER.to_string());
        }

        let prompt = build_prompt(question, &hits, self.style);
        debug!(model, contexts = hits.len(), "generating answer");
        let completion = self.generator.generate(model, &prompt).await?;
        Ok(clean_completion(&completion))
    }
}
