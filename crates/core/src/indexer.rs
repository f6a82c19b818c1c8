use crate::chunking::chunk_text;
use crate::traits::VectorIndex;
use crate::{Document, Embedder, IndexedRecord, IndexingOptions, IngestError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct IndexReport {
    pub documents: usize,
    pub empty_documents: usize,
    pub chunks: usize,
    pub batches: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

struct Candidate {
    document: Arc<Document>,
    chunk_id: u32,
    text: String,
}

/// Offline job that chunks documents, embeds the chunks in batches and
/// bulk-writes them into a vector index.
///
/// Batches are written one after another. The first failing batch ends the
/// run; batches written before it stay in the index.
pub struct Indexer<V> {
    index: V,
    embedder: Embedder,
    options: IndexingOptions,
}

impl<V> Indexer<V>
where
    V: VectorIndex + Send + Sync,
{
    pub fn new(index: V, embedder: Embedder, options: IndexingOptions) -> Result<Self, IngestError> {
        options.chunking.validate()?;
        if options.batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "batch size must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            index,
            embedder,
            options,
        })
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub async fn build_index<I>(&self, documents: I) -> Result<IndexReport, IngestError>
    where
        I: IntoIterator<Item = Document>,
    {
        let started_at = Utc::now();
        self.index.ensure_index(self.embedder.dimensions()).await?;

        let mut report = IndexReport {
            documents: 0,
            empty_documents: 0,
            chunks: 0,
            batches: 0,
            started_at,
            finished_at: started_at,
        };
        let mut pending = Vec::with_capacity(self.options.batch_size);

        for document in documents {
            report.documents += 1;
            let chunks = chunk_text(&document.content, self.options.chunking)?;
            if chunks.is_empty() {
                debug!(title = %document.title, "document has no text, nothing to index");
                report.empty_documents += 1;
                continue;
            }

            let document = Arc::new(document);
            for (chunk_id, text) in chunks.into_iter().enumerate() {
                pending.push(Candidate {
                    document: Arc::clone(&document),
                    chunk_id: chunk_id as u32,
                    text,
                });

                if pending.len() == self.options.batch_size {
                    self.write_batch(std::mem::take(&mut pending), &mut report)
                        .await?;
                }
            }
        }

        if !pending.is_empty() {
            self.write_batch(pending, &mut report).await?;
        }

        if report.batches > 0 {
            self.index.refresh().await?;
        }

        report.finished_at = Utc::now();
        info!(
            documents = report.documents,
            empty_documents = report.empty_documents,
            chunks = report.chunks,
            batches = report.batches,
            "indexing completed"
        );
        Ok(report)
    }

    async fn write_batch(
        &self,
        batch: Vec<Candidate>,
        report: &mut IndexReport,
    ) -> Result<(), IngestError> {
        let texts: Vec<String> = batch.iter().map(|candidate| candidate.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        let records: Vec<IndexedRecord> = batch
            .into_iter()
            .zip(embeddings)
            .map(|(candidate, embedding)| {
                IndexedRecord::from_chunk(
                    &candidate.document,
                    candidate.chunk_id,
                    candidate.text,
                    embedding,
                )
            })
            .collect();

        self.index.bulk_write(&records).await?;

        report.batches += 1;
        report.chunks += records.len();
        info!(batch = report.batches, records = records.len(), "indexed batch");
        Ok(())
    }
}
