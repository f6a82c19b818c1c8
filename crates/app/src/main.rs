use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ww2_rag_core::{
    CharacterNgramEmbedder, ChatTranscript, ChunkingConfig, ContextStyle, DocumentReader,
    ElasticsearchStore, Embedder, Indexer, IndexingOptions, OllamaGenerator, RagPipeline,
    Retriever, TeiEmbeddingModel, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_MODEL, FAILURE_NOTICE,
    KNOWN_MODELS,
};

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// text-embeddings-inference server
    Tei,
    /// Local hashed character trigrams, no service required
    Hashed,
}

#[derive(Parser)]
#[command(name = "ww2-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Elasticsearch base URL
    #[arg(long, env = "WW2_RAG_ELASTICSEARCH_URL", default_value = "http://localhost:9200")]
    elasticsearch_url: String,

    /// Index holding the embedded chunks
    #[arg(long, env = "WW2_RAG_INDEX", default_value = "ww2_wiki")]
    index_name: String,

    /// Elasticsearch username for basic auth
    #[arg(long, env = "WW2_RAG_ELASTICSEARCH_USER", requires = "elasticsearch_password")]
    elasticsearch_user: Option<String>,

    /// Elasticsearch password for basic auth
    #[arg(
        long,
        env = "WW2_RAG_ELASTICSEARCH_PASSWORD",
        hide_env_values = true,
        requires = "elasticsearch_user"
    )]
    elasticsearch_password: Option<String>,

    /// Embedding backend
    #[arg(long, value_enum, env = "WW2_RAG_EMBEDDER", default_value_t = EmbedderKind::Tei)]
    embedder: EmbedderKind,

    /// text-embeddings-inference base URL
    #[arg(long, env = "WW2_RAG_EMBEDDING_URL", default_value = "http://localhost:8080")]
    embedding_url: String,

    /// Width of the embedding vectors
    #[arg(long, env = "WW2_RAG_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Ollama base URL
    #[arg(long, env = "WW2_RAG_OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ceiling for a single completion request, in seconds
    #[arg(long, env = "WW2_RAG_GENERATION_TIMEOUT", default_value = "180")]
    generation_timeout_secs: u64,

    /// Ceiling for index and embedding requests, in seconds
    #[arg(long, env = "WW2_RAG_REQUEST_TIMEOUT", default_value = "60")]
    request_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and index article records (a .jsonl file or a folder of them).
    Index {
        #[arg(long)]
        input: PathBuf,
        /// Characters per chunk.
        #[arg(long, default_value = "1000")]
        max_chars: usize,
        /// Characters shared by consecutive chunks.
        #[arg(long, default_value = "200")]
        overlap: usize,
        /// Chunks embedded and written per request.
        #[arg(long, default_value = "64")]
        batch_size: usize,
    },
    /// Show the chunks most similar to a query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Answer one question from the indexed articles.
    Ask {
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        /// Render context with summary, key points, people and dates.
        #[arg(long, default_value_t = false)]
        structured: bool,
    },
    /// Interactive question loop; `exit` or end of input quits.
    Chat {
        #[arg(long, default_value = "5")]
        top_k: usize,
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        #[arg(long, default_value_t = false)]
        structured: bool,
    },
    /// List the models offered by default.
    Models,
}

impl Cli {
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn embedder(&self) -> anyhow::Result<Embedder> {
        Ok(match self.embedder {
            EmbedderKind::Tei => Embedder::new(TeiEmbeddingModel::new(
                &self.embedding_url,
                self.embedding_dimensions,
                self.request_timeout(),
            )?),
            EmbedderKind::Hashed => Embedder::new(CharacterNgramEmbedder {
                dimensions: self.embedding_dimensions,
            }),
        })
    }

    fn store(&self) -> anyhow::Result<ElasticsearchStore> {
        let store = ElasticsearchStore::new(
            &self.elasticsearch_url,
            &self.index_name,
            self.request_timeout(),
        )?;
        Ok(match (&self.elasticsearch_user, &self.elasticsearch_password) {
            (Some(user), Some(password)) => store.with_basic_auth(user, password),
            _ => store,
        })
    }

    fn pipeline(
        &self,
        structured: bool,
    ) -> anyhow::Result<RagPipeline<ElasticsearchStore, OllamaGenerator>> {
        let generator = OllamaGenerator::new(
            &self.ollama_url,
            Duration::from_secs(self.generation_timeout_secs),
        )?;
        let style = if structured {
            ContextStyle::Structured
        } else {
            ContextStyle::Plain
        };
        Ok(RagPipeline::new(Retriever::new(self.store()?, self.embedder()?), generator)
            .with_context_style(style))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        index = %cli.index_name,
        "ww2-rag boot"
    );

    match &cli.command {
        Command::Index {
            input,
            max_chars,
            overlap,
            batch_size,
        } => {
            let options = IndexingOptions {
                chunking: ChunkingConfig::new(*max_chars, *overlap)?,
                batch_size: *batch_size,
            };
            let indexer = Indexer::new(cli.store()?, cli.embedder()?, options)?;

            let mut records = DocumentReader::open(input)
                .with_context(|| format!("reading records from {}", input.display()))?;
            info!(input = %input.display(), "indexing documents");

            let report = indexer.build_index(records.by_ref()).await?;
            let skipped = records
                .finish()
                .with_context(|| format!("reading records from {}", input.display()))?;
            if !skipped.is_empty() {
                warn!(skipped = skipped.len(), "some records could not be decoded");
            }
            println!(
                "{} chunks from {} documents indexed into {} in {} batches at {}",
                report.chunks,
                report.documents,
                indexer.index().index_name(),
                report.batches,
                report.finished_at.to_rfc3339()
            );
        }
        Command::Search { query, top_k } => {
            let retriever = Retriever::new(cli.store()?, cli.embedder()?);
            let hits = retriever.retrieve(query, *top_k).await?;

            println!("query: {query}");
            if hits.is_empty() {
                println!("no hits");
            }
            for hit in hits {
                println!("[{:.4}] {} #{} {}", hit.score, hit.title, hit.chunk_id, hit.url);
                println!("  {}", hit.text);
            }
        }
        Command::Ask {
            question,
            top_k,
            model,
            structured,
        } => {
            let rag = cli.pipeline(*structured)?;
            let answer = rag.answer(question, *top_k, model).await?;
            println!("{answer}");
        }
        Command::Chat {
            top_k,
            model,
            structured,
        } => {
            let rag = cli.pipeline(*structured)?;
            let mut transcript = ChatTranscript::default();
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            println!("Ask anything about World War II (model: {model}). Type `exit` to quit.");
            loop {
                print!("> ");
                std::io::stdout().flush()?;

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
                    break;
                }

                transcript.push_user(question);
                let reply = match rag.answer(question, *top_k, model).await {
                    Ok(answer) => answer,
                    Err(error) => {
                        warn!(%error, "answering failed");
                        FAILURE_NOTICE.to_string()
                    }
                };
                println!("{}\n", transcript.push_assistant(reply).content);
            }
            info!(messages = transcript.len(), "chat session ended");
        }
        Command::Models => {
            for model in KNOWN_MODELS {
                let marker = if model == DEFAULT_MODEL { " (default)" } else { "" };
                println!("{model}{marker}");
            }
        }
    }

    Ok(())
}
