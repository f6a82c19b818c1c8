pub mod chat;
pub mod chunking;
pub mod embeddings;
pub mod endpoint;
pub mod error;
pub mod generation;
pub mod indexer;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod stores;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatMessage, ChatTranscript, Role, FAILURE_NOTICE};
pub use chunking::{chunk_text, normalize_newlines, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbeddingModel, TeiEmbeddingModel,
    DEFAULT_EMBEDDING_DIMENSIONS, PASSAGE_PREFIX, QUERY_PREFIX,
};
pub use error::{EmbeddingError, GenerationError, IngestError, RagError, SearchError};
pub use generation::{
    clean_completion, OllamaGenerator, DEFAULT_GENERATION_TIMEOUT, DEFAULT_MODEL, KNOWN_MODELS,
};
pub use indexer::{IndexReport, Indexer};
pub use ingest::{
    discover_record_files, read_documents, DocumentReader, SkippedLine, SourceReport,
};
pub use models::{Document, IndexedRecord, IndexingOptions, RetrievalHit};
pub use orchestrator::{RagPipeline, NO_RESULTS_ANSWER};
pub use prompt::{build_prompt, ContextStyle};
pub use retriever::Retriever;
pub use stores::ElasticsearchStore;
pub use traits::{TextGenerator, VectorIndex};
