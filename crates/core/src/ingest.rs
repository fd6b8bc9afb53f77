use crate::embeddings::Embedder;
use crate::models::{DocumentChunk, IngestionOutcome, PendingChunk};
use crate::traits::VectorBackend;
use crate::IngestError;
use tracing::{debug, error, info, warn};

/// Embeds chunks as they are pulled, so an embedding failure only affects the
/// chunk it happened on.
pub struct ChunkStream<I, E> {
    chunks: I,
    embedder: E,
}

impl<I, E> ChunkStream<I, E>
where
    I: Iterator<Item = PendingChunk>,
    E: Embedder,
{
    pub fn new(chunks: I, embedder: E) -> Self {
        Self { chunks, embedder }
    }
}

impl<I, E> Iterator for ChunkStream<I, E>
where
    I: Iterator<Item = PendingChunk>,
    E: Embedder,
{
    type Item = Result<DocumentChunk, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let pending = self.chunks.next()?;
        let embedded = self.embedder.embed(&pending.text).map_err(|error| {
            warn!(
                source_file = %pending.source_file,
                chunk_id = %pending.chunk_id,
                reason = %error,
                "embedding failed"
            );
            IngestError::from(error)
        });

        Some(embedded.map(|embedding| DocumentChunk {
            chunk_id: pending.chunk_id,
            text: pending.text,
            source_file: pending.source_file,
            embedding,
        }))
    }
}

/// Streams chunks into an index in fixed-size bulk requests.
pub struct BulkIndexer<'a, B: ?Sized> {
    backend: &'a B,
    index_name: &'a str,
    dimensions: usize,
    batch_size: usize,
}

impl<'a, B> BulkIndexer<'a, B>
where
    B: VectorBackend + ?Sized,
{
    pub fn new(backend: &'a B, index_name: &'a str, dimensions: usize, batch_size: usize) -> Self {
        Self {
            backend,
            index_name,
            dimensions,
            batch_size: batch_size.max(1),
        }
    }

    /// Writes every chunk of the stream and counts the results.
    ///
    /// Per-entry problems are counted as failures. A bulk request that cannot
    /// be carried out at all stops the run with [`IngestionOutcome::not_run`].
    pub async fn index_all<I>(&self, chunks: I) -> IngestionOutcome
    where
        I: IntoIterator<Item = Result<DocumentChunk, IngestError>>,
    {
        info!(index = self.index_name, "starting bulk indexing");

        let mut outcome = IngestionOutcome {
            success_count: 0,
            failure_count: 0,
        };
        let mut batch = Vec::with_capacity(self.batch_size);

        for item in chunks {
            match item {
                Ok(chunk) if chunk.embedding.len() != self.dimensions => {
                    warn!(
                        source_file = %chunk.source_file,
                        chunk_id = %chunk.chunk_id,
                        actual = chunk.embedding.len(),
                        expected = self.dimensions,
                        "embedding dimension mismatch"
                    );
                    outcome.failure_count += 1;
                }
                Ok(chunk) => {
                    batch.push(chunk);
                    if batch.len() < self.batch_size {
                        continue;
                    }
                    if !self.flush(&mut batch, &mut outcome).await {
                        return IngestionOutcome::not_run();
                    }
                }
                Err(error) => {
                    debug!(reason = %error, "chunk failed before write");
                    outcome.failure_count += 1;
                }
            }
        }

        if !self.flush(&mut batch, &mut outcome).await {
            return IngestionOutcome::not_run();
        }

        if let Err(error) = self.backend.refresh(self.index_name).await {
            warn!(index = self.index_name, reason = %error, "index refresh failed");
        }

        info!(
            index = self.index_name,
            success_count = outcome.success_count,
            failure_count = outcome.failure_count,
            "bulk indexing finished"
        );
        outcome
    }

    /// Sends the pending batch; `false` when the request could not run.
    async fn flush(&self, batch: &mut Vec<DocumentChunk>, outcome: &mut IngestionOutcome) -> bool {
        if batch.is_empty() {
            return true;
        }

        match self.backend.bulk_write(self.index_name, batch.as_slice()).await {
            Ok(response) => {
                for failed in &response.errors {
                    warn!(
                        chunk_id = %failed.chunk_id,
                        reason = %failed.reason,
                        "document not indexed"
                    );
                }
                outcome.success_count += response.succeeded as u64;
                outcome.failure_count += response.errors.len() as i64;
                batch.clear();
                true
            }
            Err(error) => {
                error!(
                    index = self.index_name,
                    batch_len = batch.len(),
                    reason = %error,
                    "bulk request could not be executed"
                );
                batch.clear();
                false
            }
        }
    }
}
