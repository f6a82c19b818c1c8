use crate::endpoint::parse_base_url;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;
use url::Url;

/// Output width of `BAAI/bge-small-en-v1.5`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

pub const PASSAGE_PREFIX: &str = "passage: ";
pub const QUERY_PREFIX: &str = "query: ";

/// A text encoder producing one fixed-width vector per input.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Shared handle over one embedding model.
///
/// Built once at startup and cloned into the indexer and the retriever. It
/// applies the passage/query prefixes the bge family was trained with and
/// guarantees unit-length output of the advertised width.
#[derive(Clone)]
pub struct Embedder {
    model: Arc<dyn EmbeddingModel>,
}

impl Embedder {
    pub fn new(model: impl EmbeddingModel + 'static) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.model.dimensions()
    }

    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<String> = texts
            .iter()
            .map(|text| format!("{PASSAGE_PREFIX}{text}"))
            .collect();
        self.encode_checked(&inputs).await
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let inputs = [format!("{QUERY_PREFIX}{text}")];
        let mut vectors = self.encode_checked(&inputs).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    async fn encode_checked(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = self.model.encode(inputs).await?;
        if vectors.len() != inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: inputs.len(),
                actual: vectors.len(),
            });
        }

        let expected = self.dimensions();
        for vector in &mut vectors {
            if vector.len() != expected {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Hashed character-trigram encoder. Deterministic and offline; retrieval
/// quality is lexical rather than semantic.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for character in window {
                let mut buffer = [0u8; 4];
                for byte in character.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingModel for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(inputs.iter().map(|input| self.embed(input)).collect())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeiModelInfo {
    pub model_id: String,
    #[serde(default)]
    pub max_input_length: Option<usize>,
    /// Largest `inputs` array the server accepts in one `/embed` call.
    #[serde(default)]
    pub max_client_batch_size: Option<usize>,
}

#[derive(Serialize)]
struct TeiEmbedRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
    truncate: bool,
}

/// Client for a text-embeddings-inference server hosting the embedding model.
///
/// The server's model info is fetched on first use and cached for the rest
/// of the process.
pub struct TeiEmbeddingModel {
    client: Client,
    endpoint: Url,
    dimensions: usize,
    info: OnceCell<TeiModelInfo>,
}

impl TeiEmbeddingModel {
    pub fn new(endpoint: &str, dimensions: usize, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: parse_base_url(endpoint)?,
            dimensions,
            info: OnceCell::new(),
        })
    }

    pub async fn model_info(&self) -> Result<&TeiModelInfo, EmbeddingError> {
        self.info
            .get_or_try_init(|| async {
                let response = self.client.get(self.endpoint.join("info")?).send().await?;
                if !response.status().is_success() {
                    return Err(EmbeddingError::BackendResponse {
                        backend: "tei".to_string(),
                        details: response.status().to_string(),
                    });
                }
                let info: TeiModelInfo = response.json().await?;
                info!(model_id = %info.model_id, dimensions = self.dimensions, "embedding model ready");
                Ok::<_, EmbeddingError>(info)
            })
            .await
    }

    async fn embed_slice(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(self.endpoint.join("embed")?)
            .json(&TeiEmbedRequest {
                inputs,
                normalize: true,
                truncate: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BackendResponse {
                backend: "tei".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl EmbeddingModel for TeiEmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let info = self.model_info().await?;
        let request_size = info
            .max_client_batch_size
            .unwrap_or(inputs.len())
            .max(1);

        let mut vectors = Vec::with_capacity(inputs.len());
        for slice in inputs.chunks(request_size) {
            vectors.extend(self.embed_slice(slice).await?);
        }
        Ok(vectors)
    }
}
